//! Deterministic branch names and commit messages.

use crate::core::types::{ChangePlan, OperationKind};

/// Maximum length of the instruction slug inside a branch name.
pub const SLUG_MAX_LEN: usize = 30;

/// Lowercase ASCII slug: alphanumerics kept, every other run collapsed to `-`.
pub fn slugify(text: &str, max_len: usize) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
        if slug.len() >= max_len {
            break;
        }
    }
    slug.truncate(max_len);
    let trimmed = slug.trim_end_matches('-');
    trimmed.to_string()
}

/// Branch for an isolated operation: `<kind>/<slug>`.
pub fn branch_name(kind: OperationKind, instruction: &str) -> String {
    let slug = slugify(instruction, SLUG_MAX_LEN);
    let slug = if slug.is_empty() {
        "change".to_string()
    } else {
        slug
    };
    format!("{}/{}", kind.as_str(), slug)
}

/// Commit message summarizing an applied plan.
pub fn commit_message(kind: OperationKind, instruction: &str, plan: &ChangePlan) -> String {
    let instruction = instruction.trim();
    let mut message = match kind {
        OperationKind::Fix => format!("Fix: {instruction}\n\n"),
        _ => format!("Implement {instruction}\n\n"),
    };
    let summary = plan.summary().trim();
    if !summary.is_empty() {
        message.push_str(summary);
        message.push_str("\n\n");
    }
    message.push_str("Changes:\n");
    for action in plan.actions() {
        let description = action.description.trim();
        if description.is_empty() {
            message.push_str(&format!("- {} {}\n", action.kind.verb(), action.relative_path));
        } else {
            message.push_str(&format!(
                "- {} {}: {}\n",
                action.kind.verb(),
                action.relative_path,
                description
            ));
        }
    }
    message
}
