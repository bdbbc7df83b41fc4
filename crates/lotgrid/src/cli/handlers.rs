use std::path::PathBuf;

use anyhow::Result;
use clap::ArgMatches;
use lotgrid_core::SlotId;

use crate::{
    commands::{
        clear, edit, hold, init, list,
        relocate::{self, MoveOptions},
        release, unlock, watch, whoami,
    },
    Context,
};

pub async fn dispatch(matches: &ArgMatches) -> Result<()> {
    let db = matches.get_one::<PathBuf>("db").cloned();
    match matches.subcommand() {
        Some(("whoami", _)) => whoami::run(db),
        Some((name, sub_m)) => {
            let ctx = Context::open(db).await?;
            handle(&ctx, name, sub_m).await
        }
        None => anyhow::bail!("Unknown command. Run 'lotgrid --help' for usage."),
    }
}

async fn handle(ctx: &Context, name: &str, sub_m: &ArgMatches) -> Result<()> {
    match name {
        "init" => init::run(ctx).await,
        "list" => list::run(ctx, sub_m.get_flag("json")).await,
        "edit" => handle_edit(ctx, sub_m).await,
        "hold" => hold::run(ctx, slot(sub_m, "slot")?, sub_m.get_flag("force")).await,
        "release" => release::run(ctx, slot(sub_m, "slot")?).await,
        "move" => handle_move(ctx, sub_m).await,
        "clear" => clear::run(ctx, &slots(sub_m, "slots"), sub_m.get_flag("yes")).await,
        "unlock-all" => unlock::run(ctx, sub_m.get_flag("yes")).await,
        "watch" => watch::run(ctx).await,
        other => anyhow::bail!("Unknown command '{other}'. Run 'lotgrid --help' for usage."),
    }
}

async fn handle_edit(ctx: &Context, sub_m: &ArgMatches) -> Result<()> {
    let options = edit::EditOptions {
        slot: slot(sub_m, "slot")?,
        name: sub_m.get_one::<String>("name").cloned(),
        attrs: strings(sub_m, "attr")
            .iter()
            .map(|raw| edit::parse_attr(raw))
            .collect::<Result<_>>()?,
        memo: sub_m.get_one::<String>("memo").cloned(),
        staff: strings(sub_m, "staff"),
        stamp: sub_m.get_flag("stamp"),
        force: sub_m.get_flag("force"),
    };
    edit::run(ctx, &options).await
}

async fn handle_move(ctx: &Context, sub_m: &ArgMatches) -> Result<()> {
    let options = MoveOptions {
        from: slot(sub_m, "from")?,
        to: slot(sub_m, "to")?,
        place: slots(sub_m, "place"),
    };
    relocate::run(ctx, &options).await
}

fn slot(sub_m: &ArgMatches, name: &str) -> Result<SlotId> {
    sub_m
        .get_one::<i64>(name)
        .copied()
        .map(SlotId::new)
        .ok_or_else(|| anyhow::anyhow!("Missing <{name}>"))
}

fn slots(sub_m: &ArgMatches, name: &str) -> Vec<SlotId> {
    sub_m
        .get_many::<i64>(name)
        .into_iter()
        .flatten()
        .copied()
        .map(SlotId::new)
        .collect()
}

fn strings(sub_m: &ArgMatches, name: &str) -> Vec<String> {
    sub_m
        .get_many::<String>(name)
        .into_iter()
        .flatten()
        .cloned()
        .collect()
}
