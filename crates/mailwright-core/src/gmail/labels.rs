//! Normalization of label change requests.
//!
//! `READ` is not a Gmail label: asking to add it means removing `UNREAD`.

pub const UNREAD: &str = "UNREAD";
const READ: &str = "READ";

/// Net label sets to submit to `messages.modify`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelChange {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

impl LabelChange {
    /// Trims, upper-cases and deduplicates both lists, then rewrites `READ`
    /// in the add list into `UNREAD` in the remove list.
    pub fn normalized(add: &[String], remove: &[String]) -> Self {
        let mut change = LabelChange::default();
        for label in normalize_tokens(add) {
            if label == READ {
                push_unique(&mut change.remove, UNREAD.to_string());
            } else {
                push_unique(&mut change.add, label);
            }
        }
        for label in normalize_tokens(remove) {
            push_unique(&mut change.remove, label);
        }
        change
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Outcome of planning a label change against a message's current labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelPlan {
    Skip(String),
    Apply(LabelChange),
}

/// A request that removes `UNREAD` from a message that is already read is a
/// no-op as a whole: nothing in it is submitted.
pub fn plan_label_change(change: LabelChange, current: &[String]) -> LabelPlan {
    if change.is_empty() {
        return LabelPlan::Skip("no label changes requested".to_string());
    }

    let already_read = !current.iter().any(|l| l == UNREAD);
    if already_read && change.remove.iter().any(|l| l == UNREAD) {
        return LabelPlan::Skip("message is already read".to_string());
    }

    LabelPlan::Apply(change)
}

fn normalize_tokens(labels: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(labels.len());
    for label in labels {
        let token = label.trim();
        if !token.is_empty() {
            push_unique(&mut out, token.to_uppercase());
        }
    }
    out
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}
