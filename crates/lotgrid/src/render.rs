//! Text and JSON views of the grid.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use lotgrid_core::{ClientId, LeaseView, Slot};
use serde_json::{json, Value};

pub fn lease_label(view: &LeaseView) -> String {
    match view {
        LeaseView::Free => "free".to_string(),
        LeaseView::HeldByMe => "held by you".to_string(),
        LeaseView::HeldByOther(holder) => format!("held by {holder}"),
        LeaseView::Expired(holder) => format!("expired ({holder})"),
    }
}

const fn lease_state(view: &LeaseView) -> &'static str {
    match view {
        LeaseView::Free => "free",
        LeaseView::HeldByMe => "mine",
        LeaseView::HeldByOther(_) => "held",
        LeaseView::Expired(_) => "expired",
    }
}

fn occupant_label(slot: &Slot) -> String {
    slot.occupant.as_ref().map_or_else(
        || "-".to_string(),
        |occupant| match &occupant.stamped_at {
            Some(stamp) => format!("{} ({stamp})", occupant.name),
            None => occupant.name.clone(),
        },
    )
}

/// One line per slot, aligned columns.
pub fn table(slots: &[Slot], me: &ClientId, now: DateTime<Utc>) -> String {
    let header = format!("{:>4}  {:<6} {:<7} {:<28} LEASE", "ID", "LABEL", "AREA", "OCCUPANT");
    let rows = slots.iter().map(|slot| {
        format!(
            "{:>4}  {:<6} {:<7} {:<28} {}",
            slot.id.get(),
            slot.label,
            slot.area,
            occupant_label(slot),
            lease_label(&LeaseView::of(slot, me, now))
        )
    });
    std::iter::once(header).chain(rows).join("\n")
}

pub fn json(slots: &[Slot], me: &ClientId, now: DateTime<Utc>) -> Value {
    Value::Array(
        slots
            .iter()
            .map(|slot| {
                let view = LeaseView::of(slot, me, now);
                json!({
                    "id": slot.id,
                    "label": slot.label,
                    "area": slot.area,
                    "occupant": slot.occupant,
                    "lease": slot.lease.as_ref().map(|lease| json!({
                        "holder": lease.holder,
                        "heartbeat": lease.heartbeat,
                        "state": lease_state(&view),
                    })),
                })
            })
            .collect(),
    )
}
