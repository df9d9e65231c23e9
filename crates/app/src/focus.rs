//! Ordering and labelling of the manual-focus step choices reported by the
//! camera ("Near 3", "None", "Far 1", ...).

/// One selectable focus step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusStep {
    /// Value the camera expects back, verbatim.
    pub raw: String,
    /// Signed step: near is negative, far positive, "None" zero.
    pub offset: i32,
    /// Display label with the magnitude as repeated glyphs, e.g. "Near +++".
    pub label: String,
}

/// Sort raw choices into near-descending-magnitude, then "None", then
/// far-ascending-magnitude. Choices the camera reports in a shape we do not
/// recognize are dropped.
pub fn order_steps(choices: &[String]) -> Vec<FocusStep> {
    let mut steps: Vec<FocusStep> = choices.iter().filter_map(|c| parse_step(c)).collect();
    steps.sort_by_key(|s| s.offset);
    steps
}

fn parse_step(raw: &str) -> Option<FocusStep> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("none") {
        return Some(FocusStep {
            raw: raw.to_string(),
            offset: 0,
            label: "None".to_string(),
        });
    }
    let (direction, magnitude) = trimmed.split_once(' ')?;
    let magnitude: i32 = magnitude.trim().parse().ok()?;
    if magnitude <= 0 {
        return None;
    }
    let offset = if direction.eq_ignore_ascii_case("near") {
        -magnitude
    } else if direction.eq_ignore_ascii_case("far") {
        magnitude
    } else {
        return None;
    };
    Some(FocusStep {
        raw: raw.to_string(),
        offset,
        label: format!("{} {}", direction, "+".repeat(magnitude as usize)),
    })
}
