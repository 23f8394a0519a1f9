//! Session selection.
//!
//! Turns a list of session names plus an optional user filter into the
//! predicate used to select rows from REVTABLEMAIN and the geometry tables.

use serde::Serialize;

use crate::core::schema::FieldRole;
use crate::core::traits::Store;
use crate::core::value::{Identifier, Value};
use crate::error::{MigrateError, Result, Warnings};
use crate::predicate::{check_length, make_in_clause, InClauseSkip, Predicate, MAX_PREDICATE_LEN};

/// A session, by id and name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRef {
    pub id: Identifier,
    pub name: String,
}

/// Selection options.
#[derive(Debug, Clone)]
pub struct SelectionOptions {
    /// Ceiling on the rendered combined predicate.
    pub max_predicate_len: usize,
    /// Fail instead of warn when a session name has no match.
    pub strict_sessions: bool,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            max_predicate_len: MAX_PREDICATE_LEN,
            strict_sessions: false,
        }
    }
}

/// Resolved selection.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Sessions that matched a requested name, in table order.
    pub sessions: Vec<SessionRef>,
    /// `SESSIONID IN (...)`, or `None` when every session is selected.
    pub session_predicate: Option<Predicate>,
    /// Session predicate AND user filter.
    pub predicate: Option<Predicate>,
    /// `predicate` rendered for the store (empty when there is none).
    pub rendered: String,
}

/// Split a semicolon-delimited session list, stripping surrounding `'`.
pub fn parse_session_list(text: &str) -> Vec<String> {
    text.split(';')
        .map(|s| s.trim().trim_matches('\'').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

async fn read_sessions(store: &dyn Store, session_table: &str) -> Result<Vec<SessionRef>> {
    let schema = store.describe(session_table).await?;
    let fields = vec![
        schema.require_role(FieldRole::SessionId)?.name.clone(),
        schema.require_role(FieldRole::SessionName)?.name.clone(),
    ];
    let mut sessions = Vec::new();
    for row in store.search(session_table, &fields, None).await? {
        let mut values = row.into_iter();
        let id = values.next().unwrap_or(Value::Null);
        let name = values.next().unwrap_or(Value::Null);
        let Some(id) = id.to_identifier() else {
            continue;
        };
        if name.is_null() {
            continue;
        }
        sessions.push(SessionRef {
            id,
            name: name.to_string(),
        });
    }
    Ok(sessions)
}

/// Build the selection for `names` in `session_table`.
///
/// Names match exactly (case-sensitive). The session predicate is omitted
/// when the matched sessions are all the sessions in the table. A predicate
/// that cannot be typed for the session id column is omitted with a warning.
///
/// # Errors
///
/// - `MigrateError::Config` when no session matches, or a name does not
///   match and `strict_sessions` is set.
/// - `MigrateError::PredicateTooLong` when the rendered predicate exceeds
///   `max_predicate_len`.
pub async fn build_selection(
    store: &dyn Store,
    session_table: &str,
    names: &[String],
    filter: Option<&Predicate>,
    options: &SelectionOptions,
    warnings: &mut Warnings,
) -> Result<Selection> {
    let all = read_sessions(store, session_table).await?;
    let total = all.len();
    let sessions: Vec<SessionRef> = all
        .into_iter()
        .filter(|s| names.iter().any(|n| *n == s.name))
        .collect();

    for name in names {
        if !sessions.iter().any(|s| s.name == *name) {
            let message = format!("Session {:?} not found in {}", name, store.workspace());
            if options.strict_sessions {
                return Err(MigrateError::Config(message));
            }
            warnings.push(message);
        }
    }
    if sessions.is_empty() {
        return Err(MigrateError::Config(format!(
            "None of the requested sessions ({}) exist in {}",
            names.join(";"),
            store.workspace()
        )));
    }

    let session_predicate = if sessions.len() != total {
        let schema = store.describe(session_table).await?;
        let id_field = schema.require_role(FieldRole::SessionId)?.name.clone();
        let ids: Vec<Value> = sessions.iter().map(|s| s.id.to_value()).collect();
        match make_in_clause(&schema, &id_field, &ids) {
            Ok(p) => Some(p),
            Err(skip) => {
                warnings.push(describe_skip(&id_field, &skip));
                None
            }
        }
    } else {
        None
    };

    let predicate = Predicate::and_opt(session_predicate.clone(), filter.cloned());
    let rendered = match &predicate {
        Some(p) => p.render_with(store.field_delimiter())?,
        None => String::new(),
    };
    check_length(&rendered, options.max_predicate_len)?;

    Ok(Selection {
        sessions,
        session_predicate,
        predicate,
        rendered,
    })
}

/// Warning text for an IN clause that could not be built.
pub fn describe_skip(field: &str, skip: &InClauseSkip) -> String {
    match skip {
        InClauseSkip::Empty => format!("Unable to create query for field {}. No values to query.", field),
        InClauseSkip::MissingField => format!("Unable to create query for field {}. Field not found.", field),
        InClauseSkip::UnsupportedType(t) => format!(
            "Query field {} has an unsupported field type {}. Query will not be created.",
            field, t
        ),
    }
}

/// Find the session named `name`.
///
/// # Errors
///
/// `MigrateError::Config` when no session has that name.
pub async fn resolve_session(store: &dyn Store, session_table: &str, name: &str) -> Result<SessionRef> {
    read_sessions(store, session_table)
        .await?
        .into_iter()
        .find(|s| s.name == name)
        .ok_or_else(|| {
            MigrateError::Config(format!(
                "Output session {:?} not found in {}",
                name,
                store.workspace()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{Field, FieldType, TableSchema};
    use crate::store::JsonWorkspace;

    fn sessions(id_type: FieldType, names: &[&str]) -> JsonWorkspace {
        JsonWorkspace::new("ws").with_table(
            TableSchema::new(
                "REVSESSIONTABLE",
                vec![
                    Field::new("SESSIONID", id_type),
                    Field::new("SESSIONNAME", FieldType::String),
                ],
            ),
            names
                .iter()
                .enumerate()
                .map(|(i, n)| vec![Value::Int(i as i64 + 1), Value::from(*n)])
                .collect(),
        )
    }

    fn names(list: &str) -> Vec<String> {
        parse_session_list(list)
    }

    #[test]
    fn test_parse_session_list() {
        assert_eq!(
            parse_session_list("'Session 1';Session 2;;'B'"),
            vec!["Session 1", "Session 2", "B"]
        );
    }

    #[tokio::test]
    async fn test_subset_emits_in_clause() {
        let ws = sessions(FieldType::Integer, &["A", "B", "C"]);
        let mut w = Warnings::default();
        let sel = build_selection(&ws, "REVSESSIONTABLE", &names("A;C"), None, &SelectionOptions::default(), &mut w)
            .await
            .unwrap();
        assert_eq!(sel.rendered, "SESSIONID IN (1,3)");
        assert_eq!(sel.sessions.len(), 2);
        assert!(w.is_empty());
    }

    #[tokio::test]
    async fn test_all_sessions_need_no_predicate() {
        let ws = sessions(FieldType::Integer, &["A", "B"]);
        let mut w = Warnings::default();
        let sel = build_selection(&ws, "REVSESSIONTABLE", &names("B;A"), None, &SelectionOptions::default(), &mut w)
            .await
            .unwrap();
        assert!(sel.session_predicate.is_none());
        assert_eq!(sel.rendered, "");

        let filter = Predicate::eq("REVIEWSTATUS", "Open");
        let sel = build_selection(
            &ws,
            "REVSESSIONTABLE",
            &names("A;B"),
            Some(&filter),
            &SelectionOptions::default(),
            &mut w,
        )
        .await
        .unwrap();
        assert_eq!(sel.rendered, "REVIEWSTATUS = 'Open'");
    }

    #[tokio::test]
    async fn test_filter_is_anded_with_sessions() {
        let ws = sessions(FieldType::Integer, &["A", "B"]);
        let mut w = Warnings::default();
        let filter = crate::predicate::parse("STATUS = 1 OR STATUS = 2").unwrap().unwrap();
        let sel = build_selection(
            &ws,
            "REVSESSIONTABLE",
            &names("A"),
            Some(&filter),
            &SelectionOptions::default(),
            &mut w,
        )
        .await
        .unwrap();
        assert_eq!(sel.rendered, "SESSIONID IN (1) AND (STATUS = 1 OR STATUS = 2)");
    }

    #[tokio::test]
    async fn test_unmatched_names_warn_or_fail() {
        let ws = sessions(FieldType::Integer, &["A", "B"]);
        let mut w = Warnings::default();
        let sel = build_selection(&ws, "REVSESSIONTABLE", &names("A;a;Z"), None, &SelectionOptions::default(), &mut w)
            .await
            .unwrap();
        assert_eq!(sel.sessions.len(), 1);
        assert_eq!(w.len(), 2);

        let strict = SelectionOptions {
            strict_sessions: true,
            ..SelectionOptions::default()
        };
        let err = build_selection(&ws, "REVSESSIONTABLE", &names("A;Z"), None, &strict, &mut w)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));

        let err = build_selection(&ws, "REVSESSIONTABLE", &names("Z"), None, &SelectionOptions::default(), &mut w)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("None of the requested sessions"));
    }

    #[tokio::test]
    async fn test_unsupported_session_id_type_warns() {
        let ws = sessions(FieldType::Raster, &["A", "B"]);
        let mut w = Warnings::default();
        let sel = build_selection(&ws, "REVSESSIONTABLE", &names("A"), None, &SelectionOptions::default(), &mut w)
            .await
            .unwrap();
        assert!(sel.predicate.is_none());
        assert!(w.contains("unsupported field type"));
    }

    #[tokio::test]
    async fn test_predicate_length_boundary() {
        let ws = sessions(FieldType::Integer, &["A", "B"]);
        let mut w = Warnings::default();
        // "SESSIONID IN (1) AND " is 21 characters; pad the filter to hit the ceiling exactly.
        let padding = MAX_PREDICATE_LEN - 21 - "NOTE = ''".len();
        let filter = Predicate::eq("NOTE", "x".repeat(padding).as_str());
        let opts = SelectionOptions::default();
        let sel = build_selection(&ws, "REVSESSIONTABLE", &names("A"), Some(&filter), &opts, &mut w)
            .await
            .unwrap();
        assert_eq!(sel.rendered.len(), MAX_PREDICATE_LEN);

        let filter = Predicate::eq("NOTE", "x".repeat(padding + 1).as_str());
        let err = build_selection(&ws, "REVSESSIONTABLE", &names("A"), Some(&filter), &opts, &mut w)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::PredicateTooLong { length: 1001, limit: 1000 }));
    }

    #[tokio::test]
    async fn test_resolve_session() {
        let ws = sessions(FieldType::Integer, &["A", "B"]);
        let s = resolve_session(&ws, "REVSESSIONTABLE", "B").await.unwrap();
        assert_eq!(s.id, Identifier::Int(2));
        assert!(resolve_session(&ws, "REVSESSIONTABLE", "b").await.is_err());
    }
}
