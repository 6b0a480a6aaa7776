// Access resolution
//
// Within a scope role grants are unioned; across scopes the outcomes are
// intersected. Absent scopes impose nothing, empty ones grant nothing.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use crate::models::{
    CallerContext, EffectiveColumnAccess, EffectiveTableAccess, MaskingFn, RoleDefinition, Row,
    Selection, TableAccessGrant, TableSchema,
};
use crate::services::masking::apply_mask;

#[derive(Debug, Clone)]
struct ColumnState {
    allowed: bool,
    masked: bool,
}

/// Outcome of one scope for one table
#[derive(Debug)]
struct ScopeAccess {
    allowed: bool,
    /// Parallel to `TableSchema::columns`
    columns: Vec<ColumnState>,
}

impl ScopeAccess {
    fn denied(table: &TableSchema) -> Self {
        Self {
            allowed: false,
            columns: vec![
                ColumnState {
                    allowed: false,
                    masked: true,
                };
                table.columns.len()
            ],
        }
    }
}

/// Resolve the caller's effective access to `table`
///
/// # Arguments
/// * `table` - Schema of the table being accessed
/// * `context` - Caller identity, one role list per scope
/// * `roles` - Role definitions by id; unknown ids are ignored
pub fn resolve_table_access(
    table: &TableSchema,
    context: &CallerContext,
    roles: &HashMap<String, RoleDefinition>,
) -> EffectiveTableAccess {
    let scopes: Vec<&[String]> = [&context.roles.user, &context.roles.service]
        .into_iter()
        .filter_map(|scope| scope.as_deref())
        .collect();

    if scopes.is_empty() {
        return unrestricted(table);
    }

    let resolved: Vec<ScopeAccess> = scopes
        .iter()
        .map(|role_ids| resolve_scope(table, role_ids, roles))
        .collect();

    intersect_scopes(table, &resolved)
}

/// Names of the columns the caller may read; empty when the table is denied
pub fn compute_allowed_columns(
    table: &TableSchema,
    context: &CallerContext,
    roles: &HashMap<String, RoleDefinition>,
) -> Vec<String> {
    let access = resolve_table_access(table, context, roles);
    if !access.allowed {
        return Vec::new();
    }

    access
        .columns
        .into_iter()
        .filter(|c| c.allowed)
        .map(|c| c.api_name)
        .collect()
}

/// Mask result rows in place of their raw values
///
/// `columns` is keyed by output column name. Names in `aggregation_aliases`
/// are never masked. Borrows the input when nothing needs masking.
pub fn mask_rows<'a>(
    rows: &'a [Row],
    columns: &HashMap<String, EffectiveColumnAccess>,
    aggregation_aliases: &HashSet<String>,
) -> Cow<'a, [Row]> {
    let masked: Vec<(&str, MaskingFn)> = columns
        .iter()
        .filter(|(name, _)| !aggregation_aliases.contains(name.as_str()))
        .filter_map(|(name, access)| match (access.masked, access.masking_fn) {
            (true, Some(kind)) => Some((name.as_str(), kind)),
            _ => None,
        })
        .collect();

    if masked.is_empty() {
        return Cow::Borrowed(rows);
    }

    let out = rows
        .iter()
        .map(|row| {
            let mut row = row.clone();
            for (name, kind) in &masked {
                if let Some(value) = row.get_mut(*name) {
                    *value = apply_mask(value, *kind);
                }
            }
            row
        })
        .collect();

    Cow::Owned(out)
}

fn resolve_scope(
    table: &TableSchema,
    role_ids: &[String],
    roles: &HashMap<String, RoleDefinition>,
) -> ScopeAccess {
    let mut scope = ScopeAccess::denied(table);

    for role in role_ids.iter().filter_map(|id| roles.get(id)) {
        let grant = match &role.tables {
            Selection::All => {
                scope.allowed = true;
                for state in scope.columns.iter_mut() {
                    state.allowed = true;
                    state.masked = false;
                }
                continue;
            }
            Selection::Only(_) => match role.grant_for(&table.id) {
                Some(grant) => grant,
                None => continue,
            },
        };

        scope.allowed = true;
        apply_grant(table, grant, &mut scope);
    }

    scope
}

fn apply_grant(table: &TableSchema, grant: &TableAccessGrant, scope: &mut ScopeAccess) {
    let masked_by_role: HashSet<&str> = grant
        .masked_columns
        .iter()
        .flatten()
        .map(String::as_str)
        .collect();

    for (column, state) in table.columns.iter().zip(scope.columns.iter_mut()) {
        let granted = match &grant.allowed_columns {
            Selection::All => true,
            Selection::Only(names) => names.iter().any(|n| n == &column.api_name),
        };
        if !granted {
            continue;
        }

        state.allowed = true;
        if !masked_by_role.contains(column.api_name.as_str()) {
            state.masked = false;
        }
    }
}

fn intersect_scopes(table: &TableSchema, scopes: &[ScopeAccess]) -> EffectiveTableAccess {
    if !scopes.iter().all(|s| s.allowed) {
        return EffectiveTableAccess {
            table_id: table.id.clone(),
            allowed: false,
            columns: Vec::new(),
        };
    }

    let columns = table
        .columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let allowed = scopes.iter().all(|s| s.columns[idx].allowed);
            let masked = allowed && scopes.iter().any(|s| s.columns[idx].masked);
            let masking_fn = if masked {
                Some(column.masking_fn.unwrap_or(MaskingFn::Full))
            } else {
                column.masking_fn
            };

            EffectiveColumnAccess {
                api_name: column.api_name.clone(),
                allowed,
                masked,
                masking_fn,
            }
        })
        .collect();

    EffectiveTableAccess {
        table_id: table.id.clone(),
        allowed: true,
        columns,
    }
}

fn unrestricted(table: &TableSchema) -> EffectiveTableAccess {
    EffectiveTableAccess {
        table_id: table.id.clone(),
        allowed: true,
        columns: table
            .columns
            .iter()
            .map(|column| EffectiveColumnAccess {
                api_name: column.api_name.clone(),
                allowed: true,
                masked: false,
                masking_fn: column.masking_fn,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn users_table() -> TableSchema {
        serde_json::from_value(json!({
            "id": "users",
            "apiName": "users",
            "database": "pg-main",
            "physicalName": "public.users",
            "columns": [
                { "apiName": "id", "physicalName": "id", "type": "uuid", "nullable": false },
                { "apiName": "email", "physicalName": "email", "type": "string",
                  "nullable": false, "maskingFn": "email" },
                { "apiName": "phone", "physicalName": "phone", "type": "string", "nullable": true },
                { "apiName": "salary", "physicalName": "salary", "type": "decimal",
                  "nullable": true, "maskingFn": "number" }
            ],
            "primaryKey": ["id"]
        }))
        .unwrap()
    }

    fn roles() -> HashMap<String, RoleDefinition> {
        let defs: Vec<RoleDefinition> = serde_json::from_value(json!([
            { "id": "admin", "tables": "*" },
            { "id": "support", "tables": [
                { "tableId": "users", "allowedColumns": ["id", "email", "phone"],
                  "maskedColumns": ["email", "phone"] }
            ]},
            { "id": "billing", "tables": [
                { "tableId": "users", "allowedColumns": ["id", "email", "salary"] }
            ]},
            { "id": "auditor", "tables": [
                { "tableId": "users", "allowedColumns": "*", "maskedColumns": ["salary"] }
            ]},
            { "id": "orders-only", "tables": [
                { "tableId": "orders", "allowedColumns": "*" }
            ]}
        ]))
        .unwrap();
        defs.into_iter().map(|r| (r.id.clone(), r)).collect()
    }

    fn column<'a>(access: &'a EffectiveTableAccess, name: &str) -> &'a EffectiveColumnAccess {
        access.column(name).unwrap()
    }

    #[test]
    fn test_no_scopes_is_unrestricted() {
        let access = resolve_table_access(&users_table(), &CallerContext::unrestricted(), &roles());
        assert!(access.allowed);
        assert!(access.columns.iter().all(|c| c.allowed && !c.masked));
        assert_eq!(column(&access, "email").masking_fn, Some(MaskingFn::Email));
    }

    #[test]
    fn test_union_within_scope_unmask_wins() {
        let ctx = CallerContext::unrestricted().with_user_roles(["support", "billing"]);
        let access = resolve_table_access(&users_table(), &ctx, &roles());

        let email = column(&access, "email");
        assert!(email.allowed);
        assert!(!email.masked);

        let phone = column(&access, "phone");
        assert!(phone.allowed && phone.masked);
        assert_eq!(phone.masking_fn, Some(MaskingFn::Full));

        assert!(column(&access, "salary").allowed);
    }

    #[test]
    fn test_intersection_across_scopes() {
        let ctx = CallerContext::unrestricted()
            .with_user_roles(["admin"])
            .with_service_roles(["orders-only"]);
        let access = resolve_table_access(&users_table(), &ctx, &roles());
        assert!(!access.allowed);
        assert!(access.columns.is_empty());
    }

    #[test]
    fn test_mask_in_any_scope_forces_masking() {
        let ctx = CallerContext::unrestricted()
            .with_user_roles(["admin"])
            .with_service_roles(["auditor"]);
        let access = resolve_table_access(&users_table(), &ctx, &roles());

        let salary = column(&access, "salary");
        assert!(salary.allowed && salary.masked);
        assert_eq!(salary.masking_fn, Some(MaskingFn::Number));
        assert!(!column(&access, "email").masked);
    }

    #[test]
    fn test_column_denied_in_one_scope() {
        let ctx = CallerContext::unrestricted()
            .with_user_roles(["admin"])
            .with_service_roles(["billing"]);
        let access = resolve_table_access(&users_table(), &ctx, &roles());
        assert!(access.allowed);
        assert!(!column(&access, "phone").allowed);
        assert!(!column(&access, "phone").masked);
        assert!(column(&access, "salary").allowed);
    }

    #[test]
    fn test_empty_scope_grants_nothing() {
        let ctx = CallerContext::unrestricted().with_user_roles(Vec::<String>::new());
        let access = resolve_table_access(&users_table(), &ctx, &roles());
        assert!(!access.allowed);
        assert!(compute_allowed_columns(&users_table(), &ctx, &roles()).is_empty());
    }

    #[test]
    fn test_wildcard_role_overrides_masking_role() {
        let ctx = CallerContext::unrestricted().with_user_roles(["support", "admin"]);
        let access = resolve_table_access(&users_table(), &ctx, &roles());
        assert!(access.columns.iter().all(|c| c.allowed && !c.masked));
    }

    #[test]
    fn test_unknown_roles_ignored() {
        let ctx = CallerContext::unrestricted().with_user_roles(["ghost", "billing"]);
        assert_eq!(
            compute_allowed_columns(&users_table(), &ctx, &roles()),
            vec!["id", "email", "salary"]
        );

        let ctx = CallerContext::unrestricted().with_user_roles(["ghost"]);
        assert!(!resolve_table_access(&users_table(), &ctx, &roles()).allowed);
    }

    fn masked_map() -> HashMap<String, EffectiveColumnAccess> {
        let ctx = CallerContext::unrestricted().with_user_roles(["support"]);
        resolve_table_access(&users_table(), &ctx, &roles())
            .columns
            .into_iter()
            .map(|c| (c.api_name.clone(), c))
            .collect()
    }

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_mask_rows_applies_masks() {
        let rows = vec![row(json!({ "id": "u1", "email": "alice@example.com", "phone": "+15551234567" }))];
        let masked = mask_rows(&rows, &masked_map(), &HashSet::new());

        assert!(matches!(masked, Cow::Owned(_)));
        assert_eq!(masked[0]["email"], json!("a***@***.com"));
        assert_eq!(masked[0]["phone"], json!("***"));
        assert_eq!(masked[0]["id"], json!("u1"));
        assert_eq!(rows[0]["email"], json!("alice@example.com"));
    }

    #[test]
    fn test_mask_rows_skips_aggregation_aliases() {
        let rows = vec![row(json!({ "email": 42, "phone": "+15551234567" }))];
        let aliases: HashSet<String> = ["email".to_string()].into_iter().collect();
        let masked = mask_rows(&rows, &masked_map(), &aliases);
        assert_eq!(masked[0]["email"], json!(42));
        assert_eq!(masked[0]["phone"], json!("***"));
    }

    #[test]
    fn test_mask_rows_borrows_when_nothing_masked() {
        let access: HashMap<String, EffectiveColumnAccess> =
            resolve_table_access(&users_table(), &CallerContext::unrestricted(), &roles())
                .columns
                .into_iter()
                .map(|c| (c.api_name.clone(), c))
                .collect();
        let rows = vec![row(json!({ "email": "alice@example.com" }))];
        assert!(matches!(mask_rows(&rows, &access, &HashSet::new()), Cow::Borrowed(_)));
    }
}
