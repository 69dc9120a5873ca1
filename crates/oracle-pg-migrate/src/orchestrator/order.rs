//! Foreign-key dependency ordering of a schema's tables.

use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use crate::core::schema::Table;

/// Order `tables` so referenced tables come before the tables that reference
/// them. Ties break by name. Tables caught in a cycle are appended in name
/// order.
///
/// Self-references and references to tables outside the set are ignored.
pub fn dependency_order(tables: Vec<Table>) -> Vec<Table> {
    let mut by_name: BTreeMap<String, Table> =
        tables.into_iter().map(|t| (t.name.clone(), t)).collect();

    // table -> tables it still waits on
    let mut pending: BTreeMap<String, BTreeSet<String>> = by_name
        .iter()
        .map(|(name, table)| {
            let deps = table
                .references
                .iter()
                .filter(|r| *r != name && by_name.contains_key(r.as_str()))
                .cloned()
                .collect();
            (name.clone(), deps)
        })
        .collect();

    let mut ordered = Vec::with_capacity(by_name.len());
    loop {
        let ready = pending
            .iter()
            .find(|(_, deps)| deps.is_empty())
            .map(|(name, _)| name.clone());
        let Some(name) = ready else { break };

        pending.remove(&name);
        for deps in pending.values_mut() {
            deps.remove(&name);
        }
        if let Some(table) = by_name.remove(&name) {
            ordered.push(table);
        }
    }

    if !by_name.is_empty() {
        let names: Vec<&str> = by_name.keys().map(String::as_str).collect();
        warn!(
            "Circular foreign keys between {}; copying them in name order",
            names.join(", ")
        );
        ordered.extend(by_name.into_values());
    }

    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(tables: &[Table]) -> Vec<&str> {
        tables.iter().map(|t| t.name.as_str()).collect()
    }

    fn table(name: &str) -> Table {
        Table::new("s", name, Vec::new())
    }

    #[test]
    fn test_parents_before_children() {
        let tables = vec![
            table("order_lines").with_reference("orders").with_reference("products"),
            table("orders").with_reference("customers"),
            table("customers"),
            table("products"),
        ];
        let ordered = dependency_order(tables);
        assert_eq!(
            names(&ordered),
            vec!["customers", "orders", "products", "order_lines"]
        );
    }

    #[test]
    fn test_independent_tables_by_name() {
        let ordered = dependency_order(vec![table("c"), table("a"), table("b")]);
        assert_eq!(names(&ordered), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cycles_appended_in_name_order() {
        let tables = vec![
            table("b").with_reference("a"),
            table("a").with_reference("b"),
            table("z"),
            table("node").with_reference("node"),
        ];
        let ordered = dependency_order(tables);
        assert_eq!(names(&ordered), vec!["node", "z", "a", "b"]);
    }

    #[test]
    fn test_self_reference_ordered_normally() {
        let tables = vec![
            table("timesheets").with_reference("emp"),
            table("emp").with_reference("emp").with_reference("dept"),
            table("dept"),
        ];
        let ordered = dependency_order(tables);
        assert_eq!(names(&ordered), vec!["dept", "emp", "timesheets"]);
    }

    #[test]
    fn test_unknown_references_ignored() {
        let ordered = dependency_order(vec![table("a").with_reference("elsewhere")]);
        assert_eq!(names(&ordered), vec!["a"]);
    }
}
