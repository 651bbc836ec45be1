#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Help,
    Clear,
    Scan,
    Connect,
    Disconnect,
    Ls,
    Cat,
    Decode,
    Status,
    Submit,
    Hint,
    Reset,
    Run,
}

#[derive(Debug)]
pub struct Command {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub min_args: usize,
    pub usage: &'static str,
    pub summary: &'static str,
    pub action: Action,
}

pub const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        aliases: &[],
        min_args: 0,
        usage: "help",
        summary: "Show this help",
        action: Action::Help,
    },
    Command {
        name: "scan",
        aliases: &[],
        min_args: 0,
        usage: "scan",
        summary: "Passive sweep (may not reveal hidden hosts)",
        action: Action::Scan,
    },
    Command {
        name: "hint",
        aliases: &[],
        min_args: 0,
        usage: "hint",
        summary: "Show a hint",
        action: Action::Hint,
    },
    Command {
        name: "connect",
        aliases: &[],
        min_args: 1,
        usage: "connect <ip|name>",
        summary: "Attempt link to target",
        action: Action::Connect,
    },
    Command {
        name: "disconnect",
        aliases: &[],
        min_args: 0,
        usage: "disconnect",
        summary: "Terminate current session",
        action: Action::Disconnect,
    },
    Command {
        name: "ls",
        aliases: &[],
        min_args: 0,
        usage: "ls",
        summary: "List files on current node",
        action: Action::Ls,
    },
    Command {
        name: "cat",
        aliases: &[],
        min_args: 1,
        usage: "cat <path>",
        summary: "Print a file",
        action: Action::Cat,
    },
    Command {
        name: "decode",
        aliases: &[],
        min_args: 2,
        usage: "decode base64|rot13 <x>",
        summary: "Decode <file|text>",
        action: Action::Decode,
    },
    Command {
        name: "status",
        aliases: &[],
        min_args: 0,
        usage: "status",
        summary: "Show progress and session time",
        action: Action::Status,
    },
    Command {
        name: "submit",
        aliases: &[],
        min_args: 1,
        usage: "submit 1234",
        summary: "Submit a discovered code",
        action: Action::Submit,
    },
    Command {
        name: "clear",
        aliases: &[],
        min_args: 0,
        usage: "clear",
        summary: "Clear the screen",
        action: Action::Clear,
    },
    Command {
        name: "reset",
        aliases: &[],
        min_args: 0,
        usage: "reset",
        summary: "Reset the exercise",
        action: Action::Reset,
    },
    Command {
        name: "run",
        aliases: &["load"],
        min_args: 0,
        usage: "run <file>",
        summary: "Load a scenario file",
        action: Action::Run,
    },
];

#[derive(Debug, PartialEq, Eq)]
pub enum Parsed {
    Empty,
    Unknown(String),
    Invoke {
        command: &'static Command,
        args: Vec<String>,
    },
}

// Commands are static, so identity is the name.
impl PartialEq for Command {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Command {}

pub fn lookup(name: &str) -> Option<&'static Command> {
    COMMANDS.iter().find(|c| {
        c.name.eq_ignore_ascii_case(name) || c.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    })
}

/// Split a console line into a command and its arguments.
///
/// `decode` keeps everything after the codec as one argument, re-joined
/// with single spaces, since the text to decode may contain spaces.
pub fn parse(line: &str) -> Parsed {
    let mut tokens = line.split_whitespace();
    let Some(first) = tokens.next() else {
        return Parsed::Empty;
    };
    let Some(command) = lookup(first) else {
        return Parsed::Unknown(first.to_lowercase());
    };

    let mut args: Vec<String> = tokens.map(str::to_string).collect();
    if command.action == Action::Decode && args.len() > 2 {
        let rest = args.split_off(1).join(" ");
        args.push(rest);
    }
    Parsed::Invoke { command, args }
}

/// Lines printed by `help`, one per command name or alias.
pub fn help_lines() -> Vec<String> {
    let mut lines = Vec::new();
    for command in COMMANDS {
        lines.push(format!("  {:<24}{}", command.usage, command.summary));
        for alias in command.aliases {
            let usage = command.usage.replacen(command.name, alias, 1);
            lines.push(format!("  {:<24}Alias for {}", usage, command.name));
        }
    }
    lines
}
