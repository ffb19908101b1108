//! Cache key naming convention.
//!
//! The store only ever sees strings. Prefix invalidation is correct only if
//! every reader names its keys the same way, so the standard views are
//! spelled out here once. Callers are free to use their own keys through
//! [`CacheableKey`].

use std::fmt;

/// Conversion of a value into a deterministic cache key.
///
/// # Examples
///
/// ```
/// use classcache_core::CacheableKey;
///
/// struct Roster { class_id: u64 }
///
/// impl CacheableKey for Roster {
///     fn to_cache_key(&self) -> String {
///         format!("roster_{}", self.class_id)
///     }
/// }
///
/// assert_eq!(Roster { class_id: 3 }.to_cache_key(), "roster_3");
/// ```
pub trait CacheableKey {
    fn to_cache_key(&self) -> String;
}

impl CacheableKey for str {
    fn to_cache_key(&self) -> String {
        self.to_string()
    }
}

impl CacheableKey for String {
    fn to_cache_key(&self) -> String {
        self.clone()
    }
}

impl<T: CacheableKey + ?Sized> CacheableKey for &T {
    fn to_cache_key(&self) -> String {
        (**self).to_cache_key()
    }
}

/// Key prefixes of the standard view families.
pub mod prefix {
    pub const USERS_BY_ROLE: &str = "users_";
    pub const USER: &str = "user_";
    pub const CLASS: &str = "class_";
    pub const CLASS_STUDENTS: &str = "class_students_";
    pub const CLASS_SESSIONS: &str = "class_sessions_";
    pub const SESSION_ATTENDANCE: &str = "attendance_session_";
    pub const DASHBOARD: &str = "dashboard_";
    pub const ADMIN_DASHBOARD: &str = "admin_dashboard_";
    pub const TEACHER_DASHBOARD: &str = "teacher_dashboard_";

    /// Every aggregate view family. Their keys are parameterized by date
    /// range or viewer, so writers can only clear them by prefix.
    pub const AGGREGATES: [&str; 3] = [DASHBOARD, ADMIN_DASHBOARD, TEACHER_DASHBOARD];
}

/// Exact keys of the unparameterized views.
pub mod exact {
    pub const USERS: &str = "users";
    pub const CLASSES: &str = "classes";
    pub const CLASSES_WITH_DETAILS: &str = "classes_with_details";
}

/// The cached views of the attendance API.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ViewKey {
    /// User list, optionally filtered by role.
    Users { role: Option<String> },
    User(u64),
    /// Class list, with or without embedded students and sessions.
    Classes { with_details: bool },
    Class(u64),
    ClassStudents(u64),
    ClassSessions(u64),
    SessionAttendance(u64),
    Dashboard { start: String, end: String },
    AdminDashboard { start: String, end: String },
    TeacherDashboard(u64),
}

impl fmt::Display for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewKey::Users { role: None } => f.write_str(exact::USERS),
            ViewKey::Users { role: Some(role) } => write!(f, "{}{role}", prefix::USERS_BY_ROLE),
            ViewKey::User(id) => write!(f, "{}{id}", prefix::USER),
            ViewKey::Classes { with_details: true } => f.write_str(exact::CLASSES_WITH_DETAILS),
            ViewKey::Classes {
                with_details: false,
            } => f.write_str(exact::CLASSES),
            ViewKey::Class(id) => write!(f, "{}{id}", prefix::CLASS),
            ViewKey::ClassStudents(id) => write!(f, "{}{id}", prefix::CLASS_STUDENTS),
            ViewKey::ClassSessions(id) => write!(f, "{}{id}", prefix::CLASS_SESSIONS),
            ViewKey::SessionAttendance(id) => write!(f, "{}{id}", prefix::SESSION_ATTENDANCE),
            ViewKey::Dashboard { start, end } => write!(f, "{}{start}_{end}", prefix::DASHBOARD),
            ViewKey::AdminDashboard { start, end } => {
                write!(f, "{}{start}_{end}", prefix::ADMIN_DASHBOARD)
            }
            ViewKey::TeacherDashboard(user_id) => {
                write!(f, "{}{user_id}", prefix::TEACHER_DASHBOARD)
            }
        }
    }
}

impl CacheableKey for ViewKey {
    fn to_cache_key(&self) -> String {
        self.to_string()
    }
}
