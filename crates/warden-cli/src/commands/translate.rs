//! `warden translate` command implementation.
//!
//! Runs one facade operation against a recording store and prints the
//! store requests it produced.

use super::{Loaded, load};
use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use warden_core::{EngineError, Principal, RecordKey};
use warden_runtime::{DryRunStore, Engine, QueryParams, error_handler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OpArg {
    GetMany,
    Get,
    Count,
    Create,
    Update,
    Delete,
    Upsert,
    UpsertMany,
}

#[derive(Debug, Clone)]
pub struct TranslateArgs {
    pub model: String,
    pub op: OpArg,
    pub filter: Option<String>,
    pub fields: Option<String>,
    pub include: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub id: Option<String>,
    pub data: Option<String>,
    pub as_user: Option<String>,
    pub role: Option<String>,
}

impl TranslateArgs {
    fn query(&self) -> QueryParams {
        QueryParams {
            filter: self.filter.clone(),
            fields: self.fields.clone(),
            include: self.include.clone(),
            limit: self.limit,
            offset: self.offset,
            sort_by: self.sort_by.clone(),
            sort_order: self.sort_order.clone(),
        }
    }

    fn principal(&self) -> Option<Principal> {
        match (&self.as_user, &self.role) {
            (Some(id), Some(role)) => Some(Principal::new(id, role)),
            _ => None,
        }
    }

    fn key(&self) -> Result<RecordKey> {
        let raw = self.id.as_deref().context("--id is required for this operation")?;
        Ok(parse_key(raw))
    }

    fn payload(&self) -> Result<Value> {
        let raw = self.data.as_deref().context("--data is required for this operation")?;
        serde_json::from_str(raw).context("--data is not valid JSON")
    }
}

/// Numbers and JSON objects are taken as typed keys, anything else as a string.
fn parse_key(raw: &str) -> RecordKey {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => RecordKey::Composite(map),
        Ok(n @ Value::Number(_)) => RecordKey::Single(n),
        _ => RecordKey::from(raw),
    }
}

/// What one translation produced.
#[derive(Debug)]
pub struct Translation {
    pub requests: Vec<Value>,
    pub outcome: Result<Value, EngineError>,
}

impl Translation {
    pub fn to_value(&self) -> Value {
        let mut out = json!({ "requests": self.requests });
        match &self.outcome {
            Ok(result) => out["result"] = result.clone(),
            Err(err) => out["error"] = json!(error_handler(err, None)),
        }
        out
    }
}

/// Run `args` through an engine built from `loaded` over a dry-run store.
pub async fn translate(loaded: Loaded, args: &TranslateArgs) -> Result<Translation> {
    let store = Arc::new(DryRunStore::new());
    let engine = Engine::builder(loaded.catalog, store.clone())
        .policies(loaded.policies)
        .config(loaded.config)
        .build();

    let outcome = match engine.model(&args.model, args.principal()) {
        Ok(facade) => match args.op {
            OpArg::GetMany => facade.get_many(args.query()).await,
            OpArg::Get => facade.get(args.key()?, args.query(), None).await,
            OpArg::Count => facade.count(args.filter.as_deref()).await,
            OpArg::Create => facade.create(&args.payload()?).await,
            OpArg::Update => facade.update(args.key()?, &args.payload()?).await,
            OpArg::Delete => facade.delete(args.key()?).await,
            OpArg::Upsert => facade.upsert(&args.payload()?).await,
            OpArg::UpsertMany => match args.payload()? {
                Value::Array(records) => facade.upsert_many(&records).await,
                _ => bail!("--data must be a JSON array for upsert-many"),
            },
        },
        Err(err) => Err(err),
    };

    Ok(Translation {
        requests: store.requests().iter().map(|r| r.to_value()).collect(),
        outcome,
    })
}

pub async fn run(config_path: &Path, args: TranslateArgs) -> Result<()> {
    let loaded = load(config_path)?;
    let translation = translate(loaded, &args).await?;
    tracing::debug!(
        model = %args.model,
        op = ?args.op,
        requests = translation.requests.len(),
        "Translation finished"
    );
    println!("{}", serde_json::to_string_pretty(&translation.to_value())?);
    if let Err(err) = translation.outcome {
        bail!("translation of {} failed: {}", args.model, err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use warden_core::{Catalog, EngineConfig};
    use warden_policy::{PolicyDocument, PolicyRegistry};

    const SCHEMA: &str = r#"
models:
  - name: Post
    fields:
      - { name: id, type: Int, id: true }
      - { name: title, required: true }
      - { name: published, type: Boolean }
"#;

    const POLICIES: &str = r#"
models:
  Post:
    roles:
      reader:
        access: { published: true }
"#;

    fn loaded() -> Loaded {
        let doc = PolicyDocument::from_yaml(POLICIES).unwrap();
        Loaded {
            config: EngineConfig::default(),
            catalog: Arc::new(Catalog::from_yaml(SCHEMA).unwrap()),
            policies: PolicyRegistry::from_document(doc),
        }
    }

    fn args(op: OpArg) -> TranslateArgs {
        TranslateArgs {
            model: "Post".to_string(),
            op,
            filter: None,
            fields: None,
            include: None,
            sort_by: None,
            sort_order: None,
            limit: None,
            offset: None,
            id: None,
            data: None,
            as_user: None,
            role: None,
        }
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("7"), RecordKey::Single(json!(7)));
        assert_eq!(parse_key("abc"), RecordKey::Single(json!("abc")));
        assert_eq!(
            parse_key(r#"{"orgId":"o1","slug":"a"}"#),
            RecordKey::Composite(json!({"orgId": "o1", "slug": "a"}).as_object().unwrap().clone())
        );
    }

    #[tokio::test]
    async fn test_get_many_as_reader_adds_access_filter() {
        let mut a = args(OpArg::GetMany);
        a.filter = Some("title=*rust*".to_string());
        a.as_user = Some("u1".to_string());
        a.role = Some("reader".to_string());

        let t = translate(loaded(), &a).await.unwrap();
        assert!(t.outcome.is_ok());
        let find = t.requests.iter().find(|r| r["operation"] == "findMany").unwrap();
        let filter = find["args"]["where"].to_string();
        assert!(filter.contains("rust"));
        assert!(filter.contains("published"));
    }

    #[tokio::test]
    async fn test_create_requires_data() {
        let err = translate(loaded(), &args(OpArg::Create)).await.unwrap_err();
        assert!(err.to_string().contains("--data"));
    }

    #[tokio::test]
    async fn test_unknown_model_reports_error_response() {
        let mut a = args(OpArg::Count);
        a.model = "Ghost".to_string();

        let t = translate(loaded(), &a).await.unwrap();
        assert!(t.requests.is_empty());
        assert_eq!(t.to_value()["error"]["status_code"], json!(400));
    }

    #[tokio::test]
    async fn test_delete_by_key_records_lookup_and_delete() {
        let mut a = args(OpArg::Delete);
        a.id = Some("5".to_string());

        let t = translate(loaded(), &a).await.unwrap();
        assert!(t.outcome.is_ok(), "{:?}", t.outcome);
        let ops: Vec<&Value> = t.requests.iter().map(|r| &r["operation"]).collect();
        assert_eq!(ops.last(), Some(&&json!("delete")));
    }
}
