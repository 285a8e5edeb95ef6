//! Client authorization policies.
//!
//! Which check applies to a presented certificate depends on two facts:
//! whether the application declares explicit client IDs, and whether the
//! gateway is scoped to a `group`/`tenant` pair. The four combinations map
//! to the four [`Policy`] variants:
//!
//! | client IDs | scoping | accepted when |
//! |------------|---------|---------------|
//! | no  | no  | `CN == application` |
//! | no  | yes | `CN == application`, `O == tenant`, `OU == group` |
//! | yes | no  | `CN ∈ client IDs` |
//! | yes | yes | `CN ∈ client IDs`, `O == tenant`, `OU == group` |
//!
//! A request is authorized when **any** subject of the presented chain is
//! accepted. An empty chain is never authorized.

use crate::subject::ParsedSubject;

/// Tenant/group scope a subject's `O`/`OU` must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope<'a> {
    /// Expected `OU`.
    pub group: &'a str,
    /// Expected `O`.
    pub tenant: &'a str,
}

impl<'a> Scope<'a> {
    /// Build a scope only when both `group` and `tenant` are non-empty.
    #[must_use]
    pub fn from_parts(group: &'a str, tenant: &'a str) -> Option<Self> {
        (!group.is_empty() && !tenant.is_empty()).then_some(Self { group, tenant })
    }

    fn admits(&self, subject: &ParsedSubject) -> bool {
        single_value_matches(&subject.organization, self.tenant)
            && single_value_matches(&subject.organizational_unit, self.group)
    }
}

/// Authorization policy selected once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Policy<'a> {
    /// `CN` must equal the application name.
    ApplicationName {
        /// Application the request is addressed to.
        application: &'a str,
    },
    /// `CN` must equal the application name within the tenant/group scope.
    ScopedApplicationName {
        /// Application the request is addressed to.
        application: &'a str,
        /// Required `O`/`OU`.
        scope: Scope<'a>,
    },
    /// `CN` must be one of the application's client IDs.
    ClientIds {
        /// Allowed common names.
        client_ids: &'a [String],
    },
    /// `CN` must be one of the client IDs within the tenant/group scope.
    ScopedClientIds {
        /// Allowed common names.
        client_ids: &'a [String],
        /// Required `O`/`OU`.
        scope: Scope<'a>,
    },
}

impl<'a> Policy<'a> {
    /// Select the policy for an application.
    #[must_use]
    pub fn select(
        client_ids: &'a [String],
        application: &'a str,
        group: &'a str,
        tenant: &'a str,
    ) -> Self {
        match (client_ids.is_empty(), Scope::from_parts(group, tenant)) {
            (true, None) => Self::ApplicationName { application },
            (true, Some(scope)) => Self::ScopedApplicationName { application, scope },
            (false, None) => Self::ClientIds { client_ids },
            (false, Some(scope)) => Self::ScopedClientIds { client_ids, scope },
        }
    }

    /// Whether a single subject satisfies this policy.
    #[must_use]
    pub fn permits(&self, subject: &ParsedSubject) -> bool {
        match self {
            Self::ApplicationName { application } => subject.common_name == *application,
            Self::ScopedApplicationName { application, scope } => {
                subject.common_name == *application && scope.admits(subject)
            }
            Self::ClientIds { client_ids } => contains(client_ids, &subject.common_name),
            Self::ScopedClientIds { client_ids, scope } => {
                contains(client_ids, &subject.common_name) && scope.admits(subject)
            }
        }
    }

    /// Whether any subject of the presented chain satisfies this policy.
    #[must_use]
    pub fn authorize(&self, subjects: &[ParsedSubject]) -> bool {
        subjects.iter().any(|subject| self.permits(subject))
    }

    /// Short label for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ApplicationName { .. } => "application_name",
            Self::ScopedApplicationName { .. } => "scoped_application_name",
            Self::ClientIds { .. } => "client_ids",
            Self::ScopedClientIds { .. } => "scoped_client_ids",
        }
    }
}

/// Select the applicable policy and evaluate it against `subjects`.
#[must_use]
pub fn authorize(
    subjects: &[ParsedSubject],
    client_ids: &[String],
    application: &str,
    group: &str,
    tenant: &str,
) -> bool {
    Policy::select(client_ids, application, group, tenant).authorize(subjects)
}

fn contains(client_ids: &[String], common_name: &str) -> bool {
    client_ids.iter().any(|id| id == common_name)
}

// Subject fields carry a single value; an empty field never matches.
fn single_value_matches(field: &str, expected: &str) -> bool {
    !field.is_empty() && field == expected
}
