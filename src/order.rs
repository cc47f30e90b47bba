use crate::entity::EntityKind;

/// Flush order for deletes: every kind appears before the kinds it holds
/// foreign keys to. Inserts run in the exact reverse.
pub const DELETE_ORDER: [EntityKind; 29] = [
    EntityKind::Property,
    EntityKind::Attachment,
    EntityKind::Comment,
    EntityKind::EventLogEntry,
    EntityKind::HistoricIdentityLink,
    EntityKind::HistoricDetail,
    EntityKind::HistoricVariableInstance,
    EntityKind::HistoricActivityInstance,
    EntityKind::HistoricTaskInstance,
    EntityKind::HistoricProcessInstance,
    EntityKind::Membership,
    EntityKind::IdentityInfo,
    EntityKind::User,
    EntityKind::Group,
    EntityKind::IdentityLink,
    EntityKind::Task,
    EntityKind::VariableInstance,
    EntityKind::EventSubscription,
    EntityKind::Job,
    EntityKind::TimerJob,
    EntityKind::SuspendedJob,
    EntityKind::DeadLetterJob,
    EntityKind::ProcessDefinitionInfo,
    EntityKind::Model,
    EntityKind::ByteArray,
    EntityKind::Resource,
    EntityKind::Deployment,
    EntityKind::Execution,
    EntityKind::ProcessDefinition,
];

pub fn delete_order() -> &'static [EntityKind] {
    &DELETE_ORDER
}

pub fn insert_order() -> impl Iterator<Item = EntityKind> {
    DELETE_ORDER.iter().rev().copied()
}

pub fn delete_position(kind: EntityKind) -> Option<usize> {
    DELETE_ORDER.iter().position(|candidate| *candidate == kind)
}

pub fn insert_position(kind: EntityKind) -> Option<usize> {
    delete_position(kind).map(|position| DELETE_ORDER.len() - 1 - position)
}

/// Orders a batch of hierarchical entities so every parent precedes its
/// children. `nodes` holds `(id, parent_key)` in batch order; the result holds
/// indexes into `nodes`. With `parent_first == false` the sequence is reversed
/// so children are removed before their parents.
///
/// Roots are nodes whose parent is not part of the batch. Siblings keep their
/// batch order. Nodes unreachable from any root (pointer cycles) are appended
/// in batch order.
pub fn hierarchical_order(nodes: &[(&str, Option<&str>)], parent_first: bool) -> Vec<usize> {
    let mut index_of = std::collections::HashMap::with_capacity(nodes.len());
    for (idx, (id, _)) in nodes.iter().enumerate() {
        index_of.entry(*id).or_insert(idx);
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut roots = Vec::new();
    for (idx, (_, parent)) in nodes.iter().enumerate() {
        match parent.and_then(|key| index_of.get(key).copied()) {
            Some(parent_idx) if parent_idx != idx => children[parent_idx].push(idx),
            _ => roots.push(idx),
        }
    }

    let mut visited = vec![false; nodes.len()];
    let mut ordered = Vec::with_capacity(nodes.len());
    let mut stack: Vec<usize> = Vec::new();
    for root in roots {
        stack.push(root);
        while let Some(idx) = stack.pop() {
            if visited[idx] {
                continue;
            }
            visited[idx] = true;
            ordered.push(idx);
            for child in children[idx].iter().rev() {
                if !visited[*child] {
                    stack.push(*child);
                }
            }
        }
    }
    for (idx, seen) in visited.iter().enumerate() {
        if !seen {
            ordered.push(idx);
        }
    }

    if !parent_first {
        ordered.reverse();
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::{
        DELETE_ORDER, delete_position, hierarchical_order, insert_order, insert_position,
    };
    use crate::entity::EntityKind;

    #[test]
    fn every_kind_is_deleted_before_what_it_references() {
        for kind in DELETE_ORDER {
            let own = delete_position(kind).expect("kind in table");
            for referenced in kind.references() {
                let other = delete_position(*referenced).expect("referenced kind in table");
                assert!(
                    own < other,
                    "{kind} must be deleted before {referenced}"
                );
            }
        }
    }

    #[test]
    fn insert_order_is_exact_reverse() {
        let inserts: Vec<_> = insert_order().collect();
        assert_eq!(inserts.len(), DELETE_ORDER.len());
        assert_eq!(inserts.first(), Some(&EntityKind::ProcessDefinition));
        assert_eq!(inserts[1], EntityKind::Execution);
        assert_eq!(inserts.last(), Some(&EntityKind::Property));
        assert_eq!(insert_position(EntityKind::ProcessDefinition), Some(0));
        assert_eq!(insert_position(EntityKind::Custom("audit")), None);
    }

    #[test]
    fn table_has_no_duplicates() {
        for (idx, kind) in DELETE_ORDER.iter().enumerate() {
            assert_eq!(delete_position(*kind), Some(idx));
        }
    }

    #[test]
    fn parent_comes_before_children_regardless_of_batch_order() {
        let nodes = [("c2", Some("p")), ("c1", Some("p")), ("p", None)];
        let order = hierarchical_order(&nodes, true);
        let ids: Vec<_> = order.iter().map(|idx| nodes[*idx].0).collect();
        assert_eq!(ids, vec!["p", "c2", "c1"]);

        let reverse = hierarchical_order(&nodes, false);
        let ids: Vec<_> = reverse.iter().map(|idx| nodes[*idx].0).collect();
        assert_eq!(ids, vec!["c1", "c2", "p"]);
    }

    #[test]
    fn deep_chains_and_external_parents() {
        let nodes = [
            ("grandchild", Some("child")),
            ("child", Some("root")),
            ("orphan", Some("not-in-batch")),
            ("root", None),
        ];
        let ids: Vec<_> = hierarchical_order(&nodes, true)
            .into_iter()
            .map(|idx| nodes[idx].0)
            .collect();
        assert_eq!(ids, vec!["orphan", "root", "child", "grandchild"]);
    }

    #[test]
    fn cycles_are_appended_in_batch_order() {
        let nodes = [("a", Some("b")), ("b", Some("a")), ("c", None)];
        let order = hierarchical_order(&nodes, true);
        assert_eq!(order, vec![2, 0, 1]);
    }
}
