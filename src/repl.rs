//! Interactive REPL.

use crate::commands::{format_tree, parse_bool, Session};
use crate::config::Config;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;

const HELP_TEXT: &str = r#"
Available commands:
  help                      Show this help

  post <event>...           Queue events for the next tick
  send <event>...           Dispatch events now
  tick [n]                  Advance n ticks (default 1)
  timer <delay> <event>     Queue an event after delay seconds
  release <state>           Commit a pending leave now

  set <guard> <true|false>  Set a guard flag
  flags                     Show guard flags
  in <state>                Is the state active?
  config                    Show the active configuration
  states                    Show every active state
  tree                      Show the chart hierarchy

  start | stop | restart    Machine lifecycle

  quit, exit                Exit the REPL
"#;

pub fn run(mut session: Session, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "scm".bold().cyan());

    let rl_config = rustyline::Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(rl_config)?;

    let history_path = config.repl.history_path();
    let _ = rl.load_history(&history_path);

    session.machine.start()?;
    print!("{}", session.drain_output());
    println!(
        "Chart {} started in {}",
        session.machine.id().cyan(),
        session.machine.active_configuration().join(", ").yellow()
    );
    println!("Type 'help' for available commands.\n");

    loop {
        let prompt = format!("{} ", format!("{}>", session.machine.id()).cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute_repl_command(&mut session, line) {
                    Ok(Some(output)) => println!("{}", output),
                    Ok(None) => break,
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);
    session.machine.stop(true);
    println!("{}", "Stopped.".dimmed());

    Ok(())
}

/// Runs one REPL line. `None` means quit.
pub fn execute_repl_command(
    session: &mut Session,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.is_empty() {
        return Ok(Some(String::new()));
    }

    let cmd = parts[0].to_lowercase();
    let args = &parts[1..];

    let message = match cmd.as_str() {
        "help" | "?" => HELP_TEXT.to_string(),

        "quit" | "exit" | "q" => return Ok(None),

        "post" | "p" => {
            if args.is_empty() {
                return Ok(Some("Usage: post <event>...".to_string()));
            }
            for event in args {
                session.machine.post_event(*event);
            }
            format!("{} {} event(s)", "Queued".green(), args.len())
        }

        "send" | "s" => {
            if args.is_empty() {
                return Ok(Some("Usage: send <event>...".to_string()));
            }
            for event in args {
                session.machine.handle_event(*event)?;
            }
            configuration(session)
        }

        "tick" | "t" => {
            let n = args.first().map(|s| s.parse::<u32>()).transpose()?.unwrap_or(1);
            session.tick(n)?;
            format!(
                "{}\n{:.3}s elapsed",
                configuration(session),
                session.machine.elapsed()
            )
        }

        "timer" => {
            if args.len() < 2 {
                return Ok(Some("Usage: timer <delay> <event>".to_string()));
            }
            let delay: f64 = args[0].parse()?;
            if !delay.is_finite() {
                return Err(format!("invalid delay '{}'", args[0]).into());
            }
            session.machine.schedule_event(delay, args[1]);
            format!(
                "{} {} in {}s ({} pending)",
                "Scheduled".green(),
                args[1].cyan(),
                delay,
                session.machine.pending_timers()
            )
        }

        "release" => {
            if args.is_empty() {
                return Ok(Some("Usage: release <state>".to_string()));
            }
            if session.machine.release_leave(args[0])? {
                configuration(session)
            } else {
                format!("{} is not leaving", args[0].cyan())
            }
        }

        "set" => {
            if args.len() < 2 {
                return Ok(Some("Usage: set <guard> <true|false>".to_string()));
            }
            let value = parse_bool(args[1]).ok_or_else(|| format!("invalid boolean '{}'", args[1]))?;
            if session.set_flag(args[0], value) {
                format!("{} = {}", args[0].cyan(), value)
            } else {
                format!("{}: no guard named {}", "Warning".yellow(), args[0])
            }
        }

        "flags" => {
            let flags = session.flags();
            if flags.is_empty() {
                "No guards".yellow().to_string()
            } else {
                flags
                    .iter()
                    .map(|(name, value)| format!("  {} = {}", name.cyan(), value))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }

        "in" => {
            if args.is_empty() {
                return Ok(Some("Usage: in <state>".to_string()));
            }
            let active = session.machine.is_in(args[0]);
            let leaving = session.machine.is_state_leaving(args[0]);
            format!(
                "{} {}{}",
                args[0].cyan(),
                if active { "active".green() } else { "inactive".red() },
                if leaving { " (leaving)" } else { "" }
            )
        }

        "config" | "c" => configuration(session),

        "states" => session.machine.active_states().join(", "),

        "tree" => format_tree(session.machine.chart()),

        "start" => {
            session.machine.start()?;
            configuration(session)
        }

        "stop" => {
            session.machine.stop(true);
            "Stopped".to_string()
        }

        "restart" => {
            session.machine.restart()?;
            configuration(session)
        }

        _ => format!("Unknown command: {}. Type 'help' for help.", cmd),
    };

    Ok(Some(format!("{}{}\n", session.drain_output(), message)))
}

fn configuration(session: &Session) -> String {
    let mut line = format!(
        "{}",
        session.machine.active_configuration().join(", ").yellow()
    );
    if session.machine.is_leaving() {
        line.push_str(" (leaving)");
    }
    if session.machine.has_pending_events() {
        let pending: Vec<&str> = session.machine.pending_events().collect();
        line.push_str(&format!(" queued: {}", pending.join(", ")));
    }
    line
}
