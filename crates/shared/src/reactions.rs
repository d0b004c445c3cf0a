use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::Reaction;

/// One emoji's worth of reactions on a message, as shown under the bubble.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: usize,
    pub user_ids: Vec<String>,
    pub reacted_by_me: bool,
}

/// Group reactions by emoji, ordered by first appearance.
pub fn group_reactions<'a, I>(reactions: I, me: &str) -> Vec<ReactionGroup>
where
    I: IntoIterator<Item = &'a Reaction>,
{
    let mut groups: Vec<ReactionGroup> = Vec::new();
    for reaction in reactions {
        let idx = match groups.iter().position(|g| g.emoji == reaction.emoji) {
            Some(idx) => idx,
            None => {
                groups.push(ReactionGroup {
                    emoji: reaction.emoji.clone(),
                    count: 0,
                    user_ids: Vec::new(),
                    reacted_by_me: false,
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[idx];
        if group.user_ids.contains(&reaction.user_id) {
            continue;
        }
        group.user_ids.push(reaction.user_id.clone());
        group.count += 1;
        group.reacted_by_me |= reaction.user_id == me;
    }
    groups
}

/// Group reactions for many messages at once, keyed by message id.
pub fn group_by_message<'a, I>(reactions: I, me: &str) -> BTreeMap<String, Vec<ReactionGroup>>
where
    I: IntoIterator<Item = &'a Reaction>,
{
    let mut per_message: BTreeMap<String, Vec<&Reaction>> = BTreeMap::new();
    for reaction in reactions {
        per_message
            .entry(reaction.message_id.clone())
            .or_default()
            .push(reaction);
    }
    per_message
        .into_iter()
        .map(|(id, list)| (id, group_reactions(list, me)))
        .collect()
}
