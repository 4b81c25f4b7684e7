// SPDX-License-Identifier: MIT OR Apache-2.0
//! Mutation ordering — groups parsed mutations into namespace buckets and
//! orders each bucket (spec §4.5.3).

use crate::report::{ReplayBucket, ReplayPlan};
use ledger_core::{external_ref_namespace, parse_external_ref, MutationPayload};

/// One parsed mutation paired with the record id and timestamp it came
/// from, since the payload itself carries neither.
pub(crate) struct TaggedMutation {
    pub(crate) id: u64,
    pub(crate) timestamp: i64,
    pub(crate) payload: MutationPayload,
}

/// Build the replay plan from parsed mutations in first-appearance
/// (ascending id) order. Returns `None` when `mutations` is empty.
pub(crate) fn build_replay_plan(mutations: &[TaggedMutation]) -> Option<ReplayPlan> {
    if mutations.is_empty() {
        return None;
    }

    let mut namespace_order: Vec<String> = Vec::new();
    let mut buckets: std::collections::HashMap<String, Vec<&TaggedMutation>> =
        std::collections::HashMap::new();
    for m in mutations {
        let ns = m
            .payload
            .external_ref
            .as_deref()
            .map(external_ref_namespace)
            .unwrap_or_else(|| "default".to_string());
        if !buckets.contains_key(&ns) {
            namespace_order.push(ns.clone());
        }
        buckets.entry(ns).or_default().push(m);
    }

    let mut out = Vec::with_capacity(namespace_order.len());
    for ns in namespace_order {
        let mut entries = buckets.remove(&ns).unwrap_or_default();

        let all_parse_in_namespace = entries.iter().all(|m| {
            m.payload
                .external_ref
                .as_deref()
                .and_then(parse_external_ref)
                .is_some_and(|(parsed_ns, _)| parsed_ns == ns)
        });

        let ordered = all_parse_in_namespace;
        if ordered {
            entries.sort_by_key(|m| {
                let offset = m
                    .payload
                    .external_ref
                    .as_deref()
                    .and_then(parse_external_ref)
                    .map(|(_, offset)| offset)
                    .unwrap_or(0);
                (offset, m.id)
            });
        } else {
            entries.sort_by_key(|m| (m.timestamp, m.id));
        }

        out.push(ReplayBucket {
            namespace: ns,
            ordered,
            record_ids: entries.iter().map(|m| m.id).collect(),
        });
    }

    Some(ReplayPlan {
        total: mutations.len() as u64,
        buckets: out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(id: u64, ts: i64, external_ref: Option<&str>) -> TaggedMutation {
        TaggedMutation {
            id,
            timestamp: ts,
            payload: MutationPayload {
                mutation_type: "insert".to_string(),
                id: id.to_string(),
                source: "s".to_string(),
                hash: None,
                external_ref: external_ref.map(str::to_string),
            },
        }
    }

    #[test]
    fn orders_by_parsed_offset_within_a_namespace() {
        let mutations = vec![
            tagged(1, 1000, Some("kafka:5")),
            tagged(2, 1001, Some("kafka:1")),
            tagged(3, 1002, Some("kafka:3")),
        ];
        let plan = build_replay_plan(&mutations).unwrap();
        assert_eq!(plan.total, 3);
        assert_eq!(plan.buckets.len(), 1);
        assert!(plan.buckets[0].ordered);
        assert_eq!(plan.buckets[0].record_ids, vec![2, 3, 1]);
    }

    #[test]
    fn falls_back_to_timestamp_order_when_unparsable() {
        let mutations = vec![
            tagged(1, 1002, Some("kafka:not-a-number")),
            tagged(2, 1000, Some("kafka:7")),
        ];
        let plan = build_replay_plan(&mutations).unwrap();
        assert_eq!(plan.buckets.len(), 1);
        assert!(!plan.buckets[0].ordered);
        assert_eq!(plan.buckets[0].record_ids, vec![2, 1]);
    }

    #[test]
    fn buckets_are_in_first_appearance_order() {
        let mutations = vec![
            tagged(1, 1000, Some("b:1")),
            tagged(2, 1001, Some("a:1")),
            tagged(3, 1002, Some("b:2")),
        ];
        let plan = build_replay_plan(&mutations).unwrap();
        let namespaces: Vec<&str> = plan.buckets.iter().map(|b| b.namespace.as_str()).collect();
        assert_eq!(namespaces, vec!["b", "a"]);
    }

    #[test]
    fn missing_external_ref_lands_in_default_bucket_unordered() {
        let mutations = vec![tagged(1, 1000, None)];
        let plan = build_replay_plan(&mutations).unwrap();
        assert_eq!(plan.buckets[0].namespace, "default");
        assert!(!plan.buckets[0].ordered);
    }

    #[test]
    fn empty_input_yields_no_plan() {
        assert!(build_replay_plan(&[]).is_none());
    }
}
