//! # Cache Invalidation Rules
//!
//! Declarative mapping from mutations to the cached views they make stale.
//!
//! Every write the remote API accepts is described by a [`MutationKind`] and a
//! [`MutationContext`] carrying the ids involved. The rule table turns that
//! pair into an [`InvalidationPlan`]: exact keys plus key prefixes to drop.
//! Evaluation is a pure function; applying the plan is the caller's job and
//! happens only after the mutation succeeded.
//!
//! - **Exact keys** cover views whose key the writer can name (`classes`,
//!   `class_5`).
//! - **Prefixes** cover views parameterized by values the writer cannot
//!   enumerate, such as date-ranged dashboards.
//! - **Scoped targets** name a key from an id in the context. When the id is
//!   missing the target widens to the prefix of the whole view family
//!   (`class_5` becomes every `class_` key).
//! - **Student-only targets** apply when the mutated user is a student or
//!   when the role is unknown.
//!
//! # Examples
//!
//! ```rust
//! use classcache_core::invalidation::{invalidations_for, MutationContext, MutationKind};
//!
//! let plan = invalidations_for(MutationKind::CreateSession, &MutationContext::new().class(5));
//!
//! assert_eq!(
//!     plan.exact_keys,
//!     vec!["class_sessions_5", "class_5", "classes", "classes_with_details"]
//! );
//! assert!(plan.prefixes.contains(&"dashboard_".to_string()));
//! assert!(plan.covers("dashboard_2024-01_2024-02"));
//! assert!(!plan.covers("users"));
//! ```

use crate::error::{CacheError, Result};
use crate::keys::{exact, prefix};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// The writes the remote API accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    CreateUser,
    UpdateUser,
    DeleteUser,
    CreateClass,
    UpdateClass,
    DeleteClass,
    CreateSession,
    UpdateSession,
    DeleteSession,
    AddStudentToClass,
    RemoveStudentFromClass,
    UpdateAttendance,
}

impl MutationKind {
    pub const ALL: [MutationKind; 12] = [
        MutationKind::CreateUser,
        MutationKind::UpdateUser,
        MutationKind::DeleteUser,
        MutationKind::CreateClass,
        MutationKind::UpdateClass,
        MutationKind::DeleteClass,
        MutationKind::CreateSession,
        MutationKind::UpdateSession,
        MutationKind::DeleteSession,
        MutationKind::AddStudentToClass,
        MutationKind::RemoveStudentFromClass,
        MutationKind::UpdateAttendance,
    ];

    /// The mutation name as written by callers, e.g. `"createSession"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::CreateUser => "createUser",
            MutationKind::UpdateUser => "updateUser",
            MutationKind::DeleteUser => "deleteUser",
            MutationKind::CreateClass => "createClass",
            MutationKind::UpdateClass => "updateClass",
            MutationKind::DeleteClass => "deleteClass",
            MutationKind::CreateSession => "createSession",
            MutationKind::UpdateSession => "updateSession",
            MutationKind::DeleteSession => "deleteSession",
            MutationKind::AddStudentToClass => "addStudentToClass",
            MutationKind::RemoveStudentFromClass => "removeStudentFromClass",
            MutationKind::UpdateAttendance => "updateAttendance",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationKind {
    type Err = CacheError;

    fn from_str(name: &str) -> Result<Self> {
        MutationKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| CacheError::UnknownMutation(name.to_string()))
    }
}

/// Ids and attributes of one mutation, drawn from its arguments or result.
///
/// Every field is optional. A missing id never skips an invalidation; it
/// widens it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationContext {
    pub user_id: Option<u64>,
    pub class_id: Option<u64>,
    pub session_id: Option<u64>,
    pub student_id: Option<u64>,
    pub role: Option<String>,
}

impl MutationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, id: u64) -> Self {
        self.user_id = Some(id);
        self
    }

    pub fn class(mut self, id: u64) -> Self {
        self.class_id = Some(id);
        self
    }

    pub fn session(mut self, id: u64) -> Self {
        self.session_id = Some(id);
        self
    }

    pub fn student(mut self, id: u64) -> Self {
        self.student_id = Some(id);
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    fn id(&self, field: IdField) -> Option<u64> {
        match field {
            IdField::User => self.user_id,
            IdField::Class => self.class_id,
            IdField::Session => self.session_id,
            IdField::Student => self.student_id,
        }
    }

    /// True for students and for users whose role is unknown.
    fn may_be_student(&self) -> bool {
        self.role
            .as_deref()
            .map_or(true, |role| role.eq_ignore_ascii_case("student"))
    }
}

/// Which context id a scoped target is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdField {
    User,
    Class,
    Session,
    Student,
}

/// One line of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetTemplate {
    /// A fixed key.
    Key(&'static str),
    /// Every key starting with the given prefix.
    Prefix(&'static str),
    /// The key `{prefix}{id}`, or the whole `prefix` family when the id is
    /// missing from the context.
    Scoped { prefix: &'static str, id: IdField },
    /// Every aggregate view family ([`prefix::AGGREGATES`]).
    Aggregates,
    /// The inner target, applied only when the mutated user may be a student.
    Student(&'static TargetTemplate),
}

/// The targets a mutation kind invalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidationRule {
    pub kind: MutationKind,
    pub targets: &'static [TargetTemplate],
}

/// Keys and prefixes to drop after one successful mutation, in rule order
/// and without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    pub exact_keys: Vec<String>,
    pub prefixes: Vec<String>,
}

impl InvalidationPlan {
    pub fn push_key(&mut self, key: String) {
        if !self.exact_keys.contains(&key) {
            self.exact_keys.push(key);
        }
    }

    pub fn push_prefix(&mut self, prefix: String) {
        if !self.prefixes.contains(&prefix) {
            self.prefixes.push(prefix);
        }
    }

    /// True if applying the plan removes `key`.
    pub fn covers(&self, key: &str) -> bool {
        self.exact_keys.iter().any(|k| k == key)
            || self.prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.exact_keys.is_empty() && self.prefixes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.exact_keys.len() + self.prefixes.len()
    }
}

use TargetTemplate::{Aggregates, Key, Prefix, Scoped, Student};

const CLASSES: TargetTemplate = Key(exact::CLASSES);
const CLASSES_WITH_DETAILS: TargetTemplate = Key(exact::CLASSES_WITH_DETAILS);

static STANDARD_RULES: [InvalidationRule; 12] = [
    InvalidationRule {
        kind: MutationKind::CreateUser,
        targets: &[
            Key(exact::USERS),
            Prefix(prefix::USERS_BY_ROLE),
            Student(&Prefix(prefix::CLASS_STUDENTS)),
            Aggregates,
        ],
    },
    InvalidationRule {
        kind: MutationKind::UpdateUser,
        targets: &[
            Key(exact::USERS),
            Prefix(prefix::USERS_BY_ROLE),
            Scoped {
                prefix: prefix::USER,
                id: IdField::User,
            },
            CLASSES,
            CLASSES_WITH_DETAILS,
            // Class objects embed their teacher
            Prefix(prefix::CLASS),
            Student(&Prefix(prefix::CLASS_STUDENTS)),
            Student(&Prefix(prefix::SESSION_ATTENDANCE)),
            Aggregates,
        ],
    },
    InvalidationRule {
        kind: MutationKind::DeleteUser,
        targets: &[
            Key(exact::USERS),
            Prefix(prefix::USERS_BY_ROLE),
            Scoped {
                prefix: prefix::USER,
                id: IdField::User,
            },
            CLASSES,
            CLASSES_WITH_DETAILS,
            Prefix(prefix::CLASS),
            Prefix(prefix::SESSION_ATTENDANCE),
            Aggregates,
        ],
    },
    InvalidationRule {
        kind: MutationKind::CreateClass,
        targets: &[CLASSES, CLASSES_WITH_DETAILS, Aggregates],
    },
    InvalidationRule {
        kind: MutationKind::UpdateClass,
        targets: &[
            CLASSES,
            CLASSES_WITH_DETAILS,
            Scoped {
                prefix: prefix::CLASS,
                id: IdField::Class,
            },
            Scoped {
                prefix: prefix::CLASS_STUDENTS,
                id: IdField::Class,
            },
            Scoped {
                prefix: prefix::CLASS_SESSIONS,
                id: IdField::Class,
            },
            Aggregates,
        ],
    },
    InvalidationRule {
        kind: MutationKind::DeleteClass,
        targets: &[
            CLASSES,
            CLASSES_WITH_DETAILS,
            Scoped {
                prefix: prefix::CLASS,
                id: IdField::Class,
            },
            Scoped {
                prefix: prefix::CLASS_STUDENTS,
                id: IdField::Class,
            },
            Scoped {
                prefix: prefix::CLASS_SESSIONS,
                id: IdField::Class,
            },
            // Session ids of a deleted class are not known to the writer
            Prefix(prefix::SESSION_ATTENDANCE),
            Aggregates,
        ],
    },
    InvalidationRule {
        kind: MutationKind::CreateSession,
        targets: &[
            Scoped {
                prefix: prefix::CLASS_SESSIONS,
                id: IdField::Class,
            },
            Scoped {
                prefix: prefix::CLASS,
                id: IdField::Class,
            },
            CLASSES,
            CLASSES_WITH_DETAILS,
            Aggregates,
        ],
    },
    InvalidationRule {
        kind: MutationKind::UpdateSession,
        targets: &[
            Scoped {
                prefix: prefix::CLASS_SESSIONS,
                id: IdField::Class,
            },
            Scoped {
                prefix: prefix::CLASS,
                id: IdField::Class,
            },
            CLASSES,
            CLASSES_WITH_DETAILS,
            Scoped {
                prefix: prefix::SESSION_ATTENDANCE,
                id: IdField::Session,
            },
            Aggregates,
        ],
    },
    InvalidationRule {
        kind: MutationKind::DeleteSession,
        targets: &[
            Scoped {
                prefix: prefix::CLASS_SESSIONS,
                id: IdField::Class,
            },
            Scoped {
                prefix: prefix::CLASS,
                id: IdField::Class,
            },
            CLASSES,
            CLASSES_WITH_DETAILS,
            Scoped {
                prefix: prefix::SESSION_ATTENDANCE,
                id: IdField::Session,
            },
            Aggregates,
        ],
    },
    InvalidationRule {
        kind: MutationKind::AddStudentToClass,
        targets: &[
            Scoped {
                prefix: prefix::CLASS_STUDENTS,
                id: IdField::Class,
            },
            Scoped {
                prefix: prefix::CLASS,
                id: IdField::Class,
            },
            CLASSES,
            CLASSES_WITH_DETAILS,
            Scoped {
                prefix: prefix::USER,
                id: IdField::Student,
            },
            Aggregates,
        ],
    },
    InvalidationRule {
        kind: MutationKind::RemoveStudentFromClass,
        targets: &[
            Scoped {
                prefix: prefix::CLASS_STUDENTS,
                id: IdField::Class,
            },
            Scoped {
                prefix: prefix::CLASS,
                id: IdField::Class,
            },
            CLASSES,
            CLASSES_WITH_DETAILS,
            Scoped {
                prefix: prefix::USER,
                id: IdField::Student,
            },
            Aggregates,
        ],
    },
    InvalidationRule {
        kind: MutationKind::UpdateAttendance,
        targets: &[
            Scoped {
                prefix: prefix::SESSION_ATTENDANCE,
                id: IdField::Session,
            },
            Aggregates,
        ],
    },
];

static STANDARD: Lazy<InvalidationRules> = Lazy::new(|| InvalidationRules {
    rules: STANDARD_RULES
        .iter()
        .map(|rule| (rule.kind, rule.targets))
        .collect(),
});

/// A complete rule table: one rule per [`MutationKind`].
#[derive(Debug, Clone)]
pub struct InvalidationRules {
    rules: HashMap<MutationKind, &'static [TargetTemplate]>,
}

impl InvalidationRules {
    /// The rule table for the attendance API views in [`crate::keys`].
    pub fn standard() -> &'static InvalidationRules {
        &STANDARD
    }

    /// Builds a custom table.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidConfig`] if a mutation kind has no rule, has two
    /// rules, or a rule names an empty key or prefix. An incomplete table is
    /// rejected up front because a missing rule only shows up later as stale
    /// reads.
    pub fn from_rules(rules: &[InvalidationRule]) -> Result<Self> {
        let mut table = HashMap::new();
        for rule in rules {
            if rule.targets.iter().any(template_is_empty) {
                return Err(CacheError::InvalidConfig(format!(
                    "rule for {} has an empty key or prefix",
                    rule.kind
                )));
            }
            if table.insert(rule.kind, rule.targets).is_some() {
                return Err(CacheError::InvalidConfig(format!(
                    "duplicate rule for {}",
                    rule.kind
                )));
            }
        }
        if let Some(missing) = MutationKind::ALL.iter().find(|k| !table.contains_key(*k)) {
            return Err(CacheError::InvalidConfig(format!("no rule for {missing}")));
        }
        Ok(Self { rules: table })
    }

    /// The raw targets of `kind`.
    pub fn targets(&self, kind: MutationKind) -> &'static [TargetTemplate] {
        self.rules.get(&kind).copied().unwrap_or(&[])
    }

    /// Evaluates the rule of `kind` against `context`.
    pub fn invalidations_for(
        &self,
        kind: MutationKind,
        context: &MutationContext,
    ) -> InvalidationPlan {
        let mut plan = InvalidationPlan::default();
        for template in self.targets(kind) {
            expand(kind, template, context, &mut plan);
        }
        plan
    }
}

fn template_is_empty(template: &TargetTemplate) -> bool {
    match template {
        Key(key) => key.is_empty(),
        Prefix(prefix) | Scoped { prefix, .. } => prefix.is_empty(),
        Aggregates => false,
        Student(inner) => template_is_empty(inner),
    }
}

fn expand(
    kind: MutationKind,
    template: &TargetTemplate,
    context: &MutationContext,
    plan: &mut InvalidationPlan,
) {
    match template {
        Key(key) => plan.push_key((*key).to_string()),
        Prefix(prefix) => plan.push_prefix((*prefix).to_string()),
        Scoped { prefix, id } => match context.id(*id) {
            Some(id) => plan.push_key(format!("{prefix}{id}")),
            None => {
                warn!(
                    mutation = %kind,
                    id = ?id,
                    prefix,
                    "mutation context lacks id, widening invalidation to prefix"
                );
                plan.push_prefix((*prefix).to_string());
            }
        },
        Aggregates => {
            for prefix in prefix::AGGREGATES {
                plan.push_prefix(prefix.to_string());
            }
        }
        Student(inner) => {
            if context.may_be_student() {
                expand(kind, inner, context, plan);
            }
        }
    }
}

/// Evaluates the standard rule table.
pub fn invalidations_for(kind: MutationKind, context: &MutationContext) -> InvalidationPlan {
    InvalidationRules::standard().invalidations_for(kind, context)
}
