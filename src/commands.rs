/// Interactive search commands and autocomplete logic

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

/// All available commands, typed with a leading `:`
pub const COMMANDS: &[Command] = &[
  Command {
    name: "go",
    aliases: &["g", "now"],
    description: "Search now without waiting",
  },
  Command {
    name: "more",
    aliases: &["m", "next"],
    description: "Load the next page of results",
  },
  Command {
    name: "retry",
    aliases: &["r"],
    description: "Retry the page that failed",
  },
  Command {
    name: "help",
    aliases: &["h", "?"],
    description: "List commands",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit search",
  },
];

/// What an input line asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input<'a> {
  /// Plain text replaces the query
  Query(&'a str),
  /// Best matching command for `:text`
  Command(&'static str),
  /// `:text` that matches nothing
  Unknown(&'a str),
}

/// Classify one input line
pub fn parse_line(line: &str) -> Input<'_> {
  match line.trim_start().strip_prefix(':') {
    Some(rest) => {
      let rest = rest.trim();
      match get_suggestions(rest).first() {
        Some(cmd) if !rest.is_empty() => Input::Command(cmd.name),
        _ => Input::Unknown(rest),
      }
    }
    None => Input::Query(line),
  }
}

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    if cmd.name == input_lower {
      matches.push((cmd, 0));
    } else if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
    } else if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
    } else if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
    }
  }

  matches.sort_by_key(|(_, priority)| *priority);
  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// One line per command, for `:help`
pub fn help_text() -> String {
  COMMANDS
    .iter()
    .map(|cmd| format!(":{:<6} {}", cmd.name, cmd.description))
    .collect::<Vec<_>>()
    .join("\n")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input_returns_all() {
    assert_eq!(get_suggestions("").len(), COMMANDS.len());
  }

  #[test]
  fn test_alias_match() {
    assert_eq!(get_suggestions("m")[0].name, "more");
    assert_eq!(get_suggestions("?")[0].name, "help");
  }

  #[test]
  fn test_prefix_match() {
    assert_eq!(get_suggestions("ret")[0].name, "retry");
  }

  #[test]
  fn test_plain_text_is_a_query() {
    assert_eq!(parse_line("rust async"), Input::Query("rust async"));
    assert_eq!(parse_line(""), Input::Query(""));
  }

  #[test]
  fn test_colon_prefix_is_a_command() {
    assert_eq!(parse_line(":more"), Input::Command("more"));
    assert_eq!(parse_line("  :q "), Input::Command("quit"));
    assert_eq!(parse_line(":bogus"), Input::Unknown("bogus"));
    assert_eq!(parse_line(":"), Input::Unknown(""));
  }
}
