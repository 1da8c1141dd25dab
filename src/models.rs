use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::gate::{Capabilities, Tab};

/// The one role name that can never be renamed, modified or deleted.
pub const RESERVED_ROLE: &str = "superadmin";

// --- Core Console Schemas (Mapped to Database) ---

/// User
///
/// Application-level profile stored in the `users` table, keyed by the identity provider's
/// subject id. `role` names a `Role` by its `name`; `None` is the distinct "no role" state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub role: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Permissions
///
/// The boolean capability flags stored on a role. Flags absent from the stored document
/// deserialize as `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(default)]
#[ts(export)]
pub struct Permissions {
    pub user_management: bool,
    pub role_management: bool,
}

/// Role
///
/// Named permission bundle from the `roles` table. `name` is unique and is the foreign key
/// referenced by `User.role`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    // Stored as a JSONB document in the `permissions` column.
    #[sqlx(json)]
    pub permissions: Permissions,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl Role {
    pub fn is_reserved(&self) -> bool {
        self.name == RESERVED_ROLE
    }
}

/// PublisherStatus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum PublisherStatus {
    #[default]
    Active,
    Deactivated,
}

impl PublisherStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublisherStatus::Active => "active",
            PublisherStatus::Deactivated => "deactivated",
        }
    }
}

/// Unknown values fall back to `Active`, matching how rows without a status have always been
/// displayed.
impl From<String> for PublisherStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "deactivated" => PublisherStatus::Deactivated,
            _ => PublisherStatus::Active,
        }
    }
}

/// Publisher
///
/// A content partner record from the `publishers` table. Apart from `name`, every descriptive
/// field is optional; the console stores whatever the form submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Publisher {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub city: Option<String>,
    pub location: Option<String>,
    pub place_name: Option<String>,
    pub street_name: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub website_url: Option<String>,
    pub instagram_url: Option<String>,
    pub twitter_url: Option<String>,
    pub facebook_url: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub tags: Vec<String>,
    // Public reference returned by the storage service after the logo upload.
    pub logo_url: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: PublisherStatus,
    pub events_count: i32,
    pub articles_count: i32,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

/// UserRequest
///
/// Payload for creating (POST /api/users) or replacing (PUT /api/users/{id}) a user record.
/// An empty `role` string is treated as "no role".
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserRequest {
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
}

impl UserRequest {
    pub fn normalized_role(&self) -> Option<String> {
        self.role
            .as_deref()
            .map(str::trim)
            .filter(|role| !role.is_empty())
            .map(str::to_string)
    }
}

/// RoleRequest
///
/// Payload for creating or replacing a role.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RoleRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Permissions,
}

/// PublisherRequest
///
/// Payload for creating a publisher. `logo_url` is the `public_url` obtained from
/// POST /api/publishers/logo after the client finished uploading.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
#[serde(default)]
pub struct PublisherRequest {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub city: Option<String>,
    pub location: Option<String>,
    pub place_name: Option<String>,
    pub street_name: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub website_url: Option<String>,
    pub instagram_url: Option<String>,
    pub twitter_url: Option<String>,
    pub facebook_url: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub tags: Vec<String>,
    pub logo_url: Option<String>,
}

/// UpdatePublisherRequest
///
/// Partial update payload (PUT /api/publishers/{id}). Only provided fields are written.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdatePublisherRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instagram_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facebook_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PublisherStatus>,
}

impl UpdatePublisherRequest {
    /// Applies the provided fields onto an existing record.
    pub fn apply(self, publisher: &mut Publisher) {
        macro_rules! assign {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field {
                    publisher.$field = Some(value);
                })*
            };
        }

        if let Some(name) = self.name {
            publisher.name = name;
        }
        assign!(
            description, category, city, location, place_name, street_name, state, zip_code,
            website_url, instagram_url, twitter_url, facebook_url, contact_name, contact_email,
            contact_phone, logo_url,
        );
        if let Some(tags) = self.tags {
            publisher.tags = tags;
        }
        if let Some(status) = self.status {
            publisher.status = status;
        }
    }
}

/// CredentialsRequest
///
/// Email + password pair for POST /auth/login and POST /auth/register. The password is only
/// forwarded to the identity provider; it is never stored or logged here.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

/// EmailRequest
///
/// Payload for POST /auth/otp and POST /auth/password/reset.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct EmailRequest {
    pub email: String,
}

/// VerifyOtpRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub token: String,
}

/// LogoUploadRequest
///
/// Input for POST /api/publishers/logo. The extension of `filename` is kept for the object key.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LogoUploadRequest {
    #[schema(example = "acme.png")]
    pub filename: String,
    #[schema(example = "image/png")]
    pub file_type: String,
}

// --- Query Parameters ---

/// PublisherFilter
///
/// Query parameters of GET /api/publishers.
#[derive(Debug, Clone, Serialize, Deserialize, Default, utoipa::IntoParams)]
pub struct PublisherFilter {
    /// Case-insensitive substring matched against name, description and contact name.
    pub search: Option<String>,
    /// Exact category slug.
    pub category: Option<String>,
    /// `active`, `deactivated`, or `Any`.
    pub status: Option<String>,
    /// Inclusive lower bound on the creation date.
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on the creation date (the whole day counts).
    pub date_to: Option<NaiveDate>,
    /// 1-based page number.
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub const DEFAULT_PER_PAGE: u32 = 10;
pub const MAX_PER_PAGE: u32 = 100;

impl PublisherFilter {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.per_page())
    }

    /// Lowercased search term, if any non-blank one was given.
    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_lowercase)
    }

    pub fn category_filter(&self) -> Option<&str> {
        self.category.as_deref().filter(|c| !c.is_empty())
    }

    /// Lowercased status to match; `None` when the filter is empty or `Any`.
    pub fn status_filter(&self) -> Option<String> {
        self.status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("any"))
            .map(str::to_lowercase)
    }

    pub fn created_from(&self) -> Option<DateTime<Utc>> {
        self.date_from
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    }

    /// Exclusive upper bound: midnight after `date_to`.
    pub fn created_before(&self) -> Option<DateTime<Utc>> {
        self.date_to
            .and_then(|date| date.checked_add_days(Days::new(1)))
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    }

    /// matches
    ///
    /// In-process version of the listing predicate. Must agree with the SQL built by
    /// `PostgresRepository::list_publishers`.
    pub fn matches(&self, publisher: &Publisher) -> bool {
        if let Some(term) = self.search_term() {
            let contains = |field: Option<&str>| {
                field.is_some_and(|value| value.to_lowercase().contains(&term))
            };
            if !(contains(Some(&publisher.name))
                || contains(publisher.description.as_deref())
                || contains(publisher.contact_name.as_deref()))
            {
                return false;
            }
        }
        if let Some(category) = self.category_filter() {
            if publisher.category.as_deref() != Some(category) {
                return false;
            }
        }
        if let Some(status) = self.status_filter() {
            if publisher.status.as_str() != status {
                return false;
            }
        }
        if let Some(from) = self.created_from() {
            if publisher.created_at < from {
                return false;
            }
        }
        if let Some(before) = self.created_before() {
            if publisher.created_at >= before {
                return false;
            }
        }
        true
    }
}

// --- Output Schemas ---

/// PublisherPage
///
/// One page of the filtered publisher listing.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PublisherPage {
    pub items: Vec<Publisher>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl PublisherPage {
    pub fn new(items: Vec<Publisher>, filter: &PublisherFilter, total: u64) -> Self {
        let per_page = filter.per_page();
        Self {
            items,
            page: filter.page(),
            per_page,
            total,
            total_pages: total.div_ceil(u64::from(per_page)),
        }
    }
}

/// RoleSummary
///
/// A role plus the number of users currently assigned to it (roles tab and GET /api/roles).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RoleSummary {
    #[serde(flatten)]
    pub role: Role,
    pub user_count: u64,
    pub reserved: bool,
}

impl RoleSummary {
    pub fn summarize(roles: Vec<Role>, users: &[User]) -> Vec<RoleSummary> {
        roles
            .into_iter()
            .map(|role| {
                let user_count = users
                    .iter()
                    .filter(|user| user.role.as_deref() == Some(role.name.as_str()))
                    .count() as u64;
                RoleSummary {
                    reserved: role.is_reserved(),
                    role,
                    user_count,
                }
            })
            .collect()
    }
}

/// Principal
///
/// Who the caller is, as far as the console knows: the session subject plus the role name
/// found on their user record (possibly dangling).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub role: Option<String>,
}

/// AuthResponse
///
/// Returned by the sign-in, OTP verification and registration endpoints. The session itself
/// travels in cookies; the body only tells the client where to go next.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
    // False when registration requires email confirmation before a session exists.
    pub signed_in: bool,
    pub redirect_to: String,
}

/// MessageResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

/// LogoUploadResponse
///
/// The presigned URL for the PUT and the public reference to persist as `logo_url`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LogoUploadResponse {
    pub upload_url: String,
    pub resource_key: String,
    pub public_url: String,
}

/// ProfileView
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ProfileView {
    pub id: Uuid,
    pub email: String,
    pub role: Option<String>,
    #[ts(type = "string | null")]
    pub created_at: Option<DateTime<Utc>>,
}

/// EntryPage
///
/// View model of the sign-in and registration pages.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct EntryPage {
    pub page: String,
    pub otp_sign_in: bool,
}

/// TabView
///
/// What the dashboard renders for the requested tab.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[ts(export)]
pub enum TabView {
    Users { users: Vec<User> },
    Roles { roles: Vec<RoleSummary> },
    AccessDenied { requested: Tab, fallback: Option<Tab> },
}

/// DashboardView
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DashboardView {
    pub principal: Principal,
    pub capabilities: Capabilities,
    pub tab: TabView,
}
