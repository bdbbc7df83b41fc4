pub mod handlers;

use clap::{value_parser, Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("lotgrid")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Shared parking grid with lease-based slot locking")
        .subcommand_required(true)
        .arg(
            Arg::new("db")
                .long("db")
                .global(true)
                .value_name("PATH")
                .value_parser(value_parser!(std::path::PathBuf))
                .help("SQLite database file (overrides store.path and LOTGRID_DB)"),
        )
        .subcommand(cmd_init())
        .subcommand(cmd_list())
        .subcommand(cmd_edit())
        .subcommand(cmd_hold())
        .subcommand(cmd_release())
        .subcommand(cmd_move())
        .subcommand(cmd_clear())
        .subcommand(cmd_unlock_all())
        .subcommand(cmd_watch())
        .subcommand(cmd_whoami())
}

fn slot_arg(name: &'static str) -> Arg {
    Arg::new(name)
        .required(true)
        .value_parser(value_parser!(i64))
        .value_name("SLOT")
}

fn force_arg() -> Arg {
    Arg::new("force")
        .long("force")
        .action(ArgAction::SetTrue)
        .help("Take the slot even if another client holds a live lease")
}

fn yes_arg() -> Arg {
    Arg::new("yes")
        .long("yes")
        .short('y')
        .action(ArgAction::SetTrue)
        .help("Skip the confirmation prompt")
}

fn cmd_init() -> Command {
    Command::new("init").about("Provision the grid from the configured layout")
}

fn cmd_list() -> Command {
    Command::new("list")
        .about("Show every slot with its occupant and lease state")
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print JSON instead of a table"),
        )
}

fn cmd_edit() -> Command {
    Command::new("edit")
        .about("Claim a slot, write its occupant, and release it")
        .arg(slot_arg("slot"))
        .arg(Arg::new("name").long("name").help("Occupant name"))
        .arg(
            Arg::new("attr")
                .long("attr")
                .value_name("KEY=VALUE")
                .action(ArgAction::Append)
                .help("Set an occupant attribute (repeatable)"),
        )
        .arg(Arg::new("memo").long("memo").help("Free-form memo"))
        .arg(
            Arg::new("staff")
                .long("staff")
                .action(ArgAction::Append)
                .help("Replace the staff list (repeatable)"),
        )
        .arg(
            Arg::new("stamp")
                .long("stamp")
                .action(ArgAction::SetTrue)
                .help("Stamp the occupant with the current time"),
        )
        .arg(force_arg())
}

fn cmd_hold() -> Command {
    Command::new("hold")
        .about("Claim a slot and keep its lease alive until Ctrl-C")
        .arg(slot_arg("slot"))
        .arg(force_arg())
}

fn cmd_release() -> Command {
    Command::new("release")
        .about("Release this client's lease on a slot")
        .arg(slot_arg("slot"))
}

fn cmd_move() -> Command {
    Command::new("move")
        .about("Move an occupant, pooling any occupant it bumps")
        .arg(slot_arg("from"))
        .arg(slot_arg("to"))
        .arg(
            Arg::new("place")
                .long("place")
                .value_name("SLOT")
                .value_parser(value_parser!(i64))
                .action(ArgAction::Append)
                .help("Place the pooled occupant here (repeatable, in order)"),
        )
}

fn cmd_clear() -> Command {
    Command::new("clear")
        .about("Clear occupants and leases from slots")
        .arg(
            Arg::new("slots")
                .required(true)
                .num_args(1..)
                .value_parser(value_parser!(i64))
                .value_name("SLOT"),
        )
        .arg(yes_arg())
}

fn cmd_unlock_all() -> Command {
    Command::new("unlock-all")
        .about("Force-release every lease, discarding in-progress edits")
        .arg(yes_arg())
}

fn cmd_watch() -> Command {
    Command::new("watch").about("Redraw the grid on every change until Ctrl-C")
}

fn cmd_whoami() -> Command {
    Command::new("whoami").about("Print this client's durable id")
}
