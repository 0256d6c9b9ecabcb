use crate::types::{ChangeSegment, Significance, Target};

/// Keep ranked segments while their combined excerpt length fits in `cap`.
///
/// Stops at the first segment that does not fit; kept segments stay in rank order.
pub fn select_for_draft(ranked: &[ChangeSegment], cap: usize) -> Vec<ChangeSegment> {
    let mut used = 0;
    let mut kept = Vec::new();
    for segment in ranked {
        let len = segment.excerpt.chars().count();
        if used + len > cap {
            break;
        }
        used += len;
        kept.push(segment.clone());
    }
    kept
}

/// Cut `text` back to its last complete line within `max_chars`.
///
/// A first line longer than the bound is cut on a char boundary.
pub fn clamp_draft(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for line in text.lines() {
        let sep = usize::from(!out.is_empty());
        let len = line.chars().count();
        if used + sep + len > max_chars {
            break;
        }
        if sep == 1 {
            out.push('\n');
        }
        out.push_str(line);
        used += sep + len;
    }
    if out.is_empty() {
        out = text.chars().take(max_chars).collect();
    }
    out
}

const PRICING_TERMS: &[&str] = &["price", "pricing", "plan", "tier", "trial", "$"];
const ROADMAP_TERMS: &[&str] = &["launch", "release", "feature", "deprecated"];

/// Follow-ups suggested for a change, derived from the keywords its segments matched.
pub fn recommended_actions(segments: &[ChangeSegment]) -> Vec<&'static str> {
    let mut actions = Vec::new();
    if matches_any(segments, PRICING_TERMS) {
        actions.push("Review the pricing comparison against this change");
    }
    if matches_any(segments, ROADMAP_TERMS) {
        actions.push("Assess roadmap impact of the announced features");
    }
    actions.push("Share this summary with the sales team");
    actions
}

fn matches_any(segments: &[ChangeSegment], terms: &[&str]) -> bool {
    segments
        .iter()
        .flat_map(|s| s.keywords.iter())
        .any(|k| terms.iter().any(|t| k == t))
}

/// Deterministic bullet brief: header lines, one bullet per segment, then a
/// "Recommended actions" section.
///
/// Bullets are added whole, in the given order, while the brief fits in `max_chars`.
/// When not even one bullet fits next to the actions, the actions are left out.
pub fn render_bullets(target: &Target, segments: &[ChangeSegment], max_chars: usize) -> String {
    let significance = Significance::assess(segments);
    let header = [
        format!("Change detected on {} ({})", target.id, target.locator),
        format!("Significance: {significance} | Tone: {}", target.tone),
    ];
    let header_len = joined_len(&header);
    let bullets: Vec<String> = segments.iter().map(bullet).collect();

    let mut actions = vec![String::new(), "Recommended actions:".to_string()];
    actions.extend(recommended_actions(segments).into_iter().map(|a| format!("- {a}")));
    let actions_len = joined_len(&actions) + 1;

    let mut kept = fit(&bullets, max_chars.saturating_sub(actions_len), header_len);
    if kept == 0 && !bullets.is_empty() {
        kept = fit(&bullets, max_chars, header_len);
        actions.clear();
    }

    let mut lines: Vec<String> = header.to_vec();
    lines.extend(bullets.into_iter().take(kept));
    lines.extend(actions);
    clamp_draft(&lines.join("\n"), max_chars)
}

fn bullet(segment: &ChangeSegment) -> String {
    let mut bullet = format!("- [{}] {}", segment.kind, segment.excerpt);
    if !segment.keywords.is_empty() {
        bullet.push_str(&format!(" (matches: {})", segment.keywords.join(", ")));
    }
    bullet
}

fn joined_len(lines: &[String]) -> usize {
    lines.iter().map(|l| l.chars().count()).sum::<usize>() + lines.len().saturating_sub(1)
}

/// How many leading bullets fit in `budget` after `used` chars.
fn fit(bullets: &[String], budget: usize, mut used: usize) -> usize {
    let mut kept = 0;
    for bullet in bullets {
        let len = bullet.chars().count() + 1;
        if used + len > budget {
            break;
        }
        used += len;
        kept += 1;
    }
    kept
}
