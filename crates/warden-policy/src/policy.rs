//! The access policy seam.

use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use warden_core::{Predicate, Principal};

/// Outcome of an access, update or delete filter.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PolicyFilter {
    /// No restriction (`true`, `{}` or no filter function).
    #[default]
    Unrestricted,
    /// Deny the operation entirely (`false`).
    Deny,
    /// Restrict to rows matching the predicate.
    Where(Predicate),
}

impl PolicyFilter {
    /// Interpret a JSON filter value: `true`, `null` and `{}` are unrestricted,
    /// `false` denies, a non-empty object restricts. Anything else denies.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null | Value::Bool(true) => PolicyFilter::Unrestricted,
            Value::Bool(false) => PolicyFilter::Deny,
            Value::Object(map) if map.is_empty() => PolicyFilter::Unrestricted,
            Value::Object(map) => PolicyFilter::Where(Predicate::from_map(map)),
            _ => PolicyFilter::Deny,
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, PolicyFilter::Deny)
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, PolicyFilter::Unrestricted)
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        match self {
            PolicyFilter::Where(p) => Some(p),
            _ => None,
        }
    }

    /// The predicate to AND into a query. Empty for `Unrestricted` and `Deny`;
    /// callers reject `Deny` before asking.
    pub fn into_predicate(self) -> Predicate {
        match self {
            PolicyFilter::Where(p) => p,
            _ => Predicate::new(),
        }
    }
}

/// Per-model access rules. Every method has an unrestricted default, so an
/// implementation only overrides what it restricts.
pub trait AccessPolicy: Send + Sync {
    /// Whether `user` may create a record from `data`.
    fn can_create(&self, _user: &Principal, _data: &Value) -> bool {
        true
    }

    /// Rows `user` may read.
    fn access_filter(&self, _user: &Principal) -> PolicyFilter {
        PolicyFilter::Unrestricted
    }

    /// Rows `user` may update. `current` is the record as loaded before the update.
    fn update_filter(&self, _user: &Principal, _current: Option<&Value>) -> PolicyFilter {
        PolicyFilter::Unrestricted
    }

    /// Rows `user` may delete. `current` is the record as loaded before the delete.
    fn delete_filter(&self, _user: &Principal, _current: Option<&Value>) -> PolicyFilter {
        PolicyFilter::Unrestricted
    }

    /// Fields hidden from `user`.
    fn omit_fields(&self, _user: &Principal) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

type CreateFn = Box<dyn Fn(&Principal, &Value) -> bool + Send + Sync>;
type AccessFn = Box<dyn Fn(&Principal) -> PolicyFilter + Send + Sync>;
type MutationFn = Box<dyn Fn(&Principal, Option<&Value>) -> PolicyFilter + Send + Sync>;
type OmitFn = Box<dyn Fn(&Principal) -> BTreeSet<String> + Send + Sync>;

/// Access policy assembled from optional closures. A missing closure means
/// unrestricted.
///
/// ```
/// use warden_policy::{FnPolicy, PolicyFilter};
/// use warden_core::Predicate;
/// use serde_json::json;
///
/// let policy = FnPolicy::new()
///     .with_access_filter(|user| {
///         PolicyFilter::Where(Predicate::from_value(json!({"ownerId": {"equals": user.id}})))
///     })
///     .with_omitted(["password"]);
/// ```
#[derive(Default)]
pub struct FnPolicy {
    can_create: Option<CreateFn>,
    access: Option<AccessFn>,
    update: Option<MutationFn>,
    delete: Option<MutationFn>,
    omit: Option<OmitFn>,
}

impl FnPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_can_create<F>(mut self, f: F) -> Self
    where
        F: Fn(&Principal, &Value) -> bool + Send + Sync + 'static,
    {
        self.can_create = Some(Box::new(f));
        self
    }

    pub fn with_access_filter<F>(mut self, f: F) -> Self
    where
        F: Fn(&Principal) -> PolicyFilter + Send + Sync + 'static,
    {
        self.access = Some(Box::new(f));
        self
    }

    pub fn with_update_filter<F>(mut self, f: F) -> Self
    where
        F: Fn(&Principal, Option<&Value>) -> PolicyFilter + Send + Sync + 'static,
    {
        self.update = Some(Box::new(f));
        self
    }

    pub fn with_delete_filter<F>(mut self, f: F) -> Self
    where
        F: Fn(&Principal, Option<&Value>) -> PolicyFilter + Send + Sync + 'static,
    {
        self.delete = Some(Box::new(f));
        self
    }

    pub fn with_omit_fields<F>(mut self, f: F) -> Self
    where
        F: Fn(&Principal) -> BTreeSet<String> + Send + Sync + 'static,
    {
        self.omit = Some(Box::new(f));
        self
    }

    /// Hide the same fields from every principal.
    pub fn with_omitted<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: BTreeSet<String> = fields.into_iter().map(Into::into).collect();
        self.with_omit_fields(move |_| fields.clone())
    }
}

impl fmt::Debug for FnPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPolicy")
            .field("can_create", &self.can_create.is_some())
            .field("access", &self.access.is_some())
            .field("update", &self.update.is_some())
            .field("delete", &self.delete.is_some())
            .field("omit", &self.omit.is_some())
            .finish()
    }
}

impl AccessPolicy for FnPolicy {
    fn can_create(&self, user: &Principal, data: &Value) -> bool {
        self.can_create.as_ref().is_none_or(|f| f(user, data))
    }

    fn access_filter(&self, user: &Principal) -> PolicyFilter {
        self.access.as_ref().map(|f| f(user)).unwrap_or_default()
    }

    fn update_filter(&self, user: &Principal, current: Option<&Value>) -> PolicyFilter {
        self.update.as_ref().map(|f| f(user, current)).unwrap_or_default()
    }

    fn delete_filter(&self, user: &Principal, current: Option<&Value>) -> PolicyFilter {
        self.delete.as_ref().map(|f| f(user, current)).unwrap_or_default()
    }

    fn omit_fields(&self, user: &Principal) -> BTreeSet<String> {
        self.omit.as_ref().map(|f| f(user)).unwrap_or_default()
    }
}
