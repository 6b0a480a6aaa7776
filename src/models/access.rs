// Roles, caller identity and resolved access decisions

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Obfuscation applied to a visible-but-masked column
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MaskingFn {
    Email,
    Phone,
    Name,
    Uuid,
    Number,
    Date,
    Full,
}

impl MaskingFn {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaskingFn::Email => "email",
            MaskingFn::Phone => "phone",
            MaskingFn::Name => "name",
            MaskingFn::Uuid => "uuid",
            MaskingFn::Number => "number",
            MaskingFn::Date => "date",
            MaskingFn::Full => "full",
        }
    }
}

/// Either the `"*"` wildcard or an explicit list
#[derive(Debug, Clone, PartialEq)]
pub enum Selection<T> {
    All,
    Only(Vec<T>),
}

impl<T: Serialize> Serialize for Selection<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Selection::All => serializer.serialize_str("*"),
            Selection::Only(items) => items.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Selection<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw<T> {
            Wildcard(String),
            List(Vec<T>),
        }

        match Raw::<T>::deserialize(deserializer)? {
            Raw::Wildcard(s) if s == "*" => Ok(Selection::All),
            Raw::Wildcard(s) => Err(serde::de::Error::custom(format!(
                "expected \"*\" or a list, found \"{}\"",
                s
            ))),
            Raw::List(items) => Ok(Selection::Only(items)),
        }
    }
}

/// One role's grant on one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableAccessGrant {
    pub table_id: String,
    pub allowed_columns: Selection<String>,
    /// Columns visible only in masked form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub masked_columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub id: String,
    pub tables: Selection<TableAccessGrant>,
}

impl RoleDefinition {
    pub fn grant_for(&self, table_id: &str) -> Option<&TableAccessGrant> {
        match &self.tables {
            Selection::All => None,
            Selection::Only(grants) => grants.iter().find(|g| g.table_id == table_id),
        }
    }
}

/// Role ids per authorization scope. An absent scope imposes no constraint,
/// a present but empty one grants nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeRoles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallerContext {
    pub roles: ScopeRoles,
}

impl CallerContext {
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn with_user_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.user = Some(roles.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_service_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.service = Some(roles.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveColumnAccess {
    pub api_name: String,
    pub allowed: bool,
    pub masked: bool,
    pub masking_fn: Option<MaskingFn>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveTableAccess {
    pub table_id: String,
    pub allowed: bool,
    /// In schema column order; empty when the table is denied
    pub columns: Vec<EffectiveColumnAccess>,
}

impl EffectiveTableAccess {
    pub fn column(&self, api_name: &str) -> Option<&EffectiveColumnAccess> {
        self.columns.iter().find(|c| c.api_name == api_name)
    }

    pub fn is_column_allowed(&self, api_name: &str) -> bool {
        self.allowed && self.column(api_name).map_or(false, |c| c.allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wildcard_role_parsing() {
        let role: RoleDefinition =
            serde_json::from_value(json!({ "id": "admin", "tables": "*" })).unwrap();
        assert_eq!(role.tables, Selection::All);
        assert!(role.grant_for("orders").is_none());
    }

    #[test]
    fn test_listed_role_parsing() {
        let role: RoleDefinition = serde_json::from_value(json!({
            "id": "support",
            "tables": [
                { "tableId": "users", "allowedColumns": ["id", "email"], "maskedColumns": ["email"] },
                { "tableId": "orders", "allowedColumns": "*" }
            ]
        }))
        .unwrap();

        let users = role.grant_for("users").unwrap();
        assert_eq!(
            users.allowed_columns,
            Selection::Only(vec!["id".to_string(), "email".to_string()])
        );
        assert_eq!(users.masked_columns.as_deref(), Some(&["email".to_string()][..]));
        assert_eq!(role.grant_for("orders").unwrap().allowed_columns, Selection::All);
        assert!(role.grant_for("events").is_none());
    }

    #[test]
    fn test_bad_wildcard_rejected() {
        let parsed: Result<RoleDefinition, _> =
            serde_json::from_value(json!({ "id": "x", "tables": "all" }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_caller_context_scopes() {
        let ctx: CallerContext = serde_json::from_value(json!({ "roles": { "user": [] } })).unwrap();
        assert_eq!(ctx.roles.user, Some(vec![]));
        assert!(ctx.roles.service.is_none());

        let ctx = CallerContext::unrestricted().with_service_roles(["etl"]);
        assert_eq!(ctx.roles.service, Some(vec!["etl".to_string()]));
    }
}
