//! Vehicle recommendation for the travelling party.

use voyage_core::types::{VehicleAssignment, VehicleTier};

const WHEELCHAIR_NOTE: &str =
    "A wheelchair is provided free of charge for travelers with reduced mobility.";
const NO_ACCESSIBILITY_NOTE: &str = "No special accessibility features requested.";

/// Pick a vehicle tier from the party size. An unstated size (0) gets the
/// smallest tier.
pub fn assign(party_size: u32, has_accessibility_need: bool) -> VehicleAssignment {
    let (tier, tier_label, price_note) = match party_size {
        0..=5 => (VehicleTier::Sedan, "Sedan (suitable for up to 5 people)", "$80"),
        6..=7 => (
            VehicleTier::SevenSeater,
            "7-seater car (suitable for groups of up to 7)",
            "$85",
        ),
        _ => (
            VehicleTier::MiniVan,
            "Mini van (suitable for larger groups)",
            "$90",
        ),
    };

    let accessibility_note = if has_accessibility_need {
        WHEELCHAIR_NOTE
    } else {
        NO_ACCESSIBILITY_NOTE
    };

    VehicleAssignment {
        tier,
        tier_label: tier_label.to_string(),
        price_note: price_note.to_string(),
        accessibility_note: accessibility_note.to_string(),
    }
}

/// The text shown to the user.
pub fn recommendation_message(assignment: &VehicleAssignment) -> String {
    format!(
        "Recommended vehicle: {}. Price: {}. {}",
        assignment.tier_label, assignment.price_note, assignment.accessibility_note
    )
}
