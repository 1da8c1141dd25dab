use chrono::NaiveDate;
use publisher_console::{
    gate::Tab,
    models::{
        Permissions, PublisherFilter, PublisherStatus, RoleRequest, RoleSummary,
        UpdatePublisherRequest, User, UserRequest,
    },
    repository::role,
    taxonomy::{self, category_label, slugify},
};
use uuid::Uuid;

// --- Serialization ---

#[test]
fn test_role_permissions_default_to_false_when_absent() {
    let req: RoleRequest = serde_json::from_str(r#"{ "name": "viewer" }"#).unwrap();
    assert_eq!(req.permissions, Permissions::default());

    let partial: Permissions = serde_json::from_str(r#"{ "role_management": true }"#).unwrap();
    assert!(!partial.user_management);
    assert!(partial.role_management);
}

#[test]
fn test_empty_flags_document_grants_nothing() {
    // Roles stored without flags are read back as '{}'.
    let flags: Permissions = serde_json::from_str("{}").unwrap();
    assert_eq!(flags, Permissions::default());
    assert!(!flags.user_management);
    assert!(!flags.role_management);
}

#[test]
fn test_publisher_status_wire_format() {
    assert_eq!(
        serde_json::to_string(&PublisherStatus::Deactivated).unwrap(),
        r#""deactivated""#
    );
    assert_eq!(PublisherStatus::from("something-else".to_string()), PublisherStatus::Active);
    assert_eq!(PublisherStatus::from("deactivated".to_string()), PublisherStatus::Deactivated);
}

#[test]
fn test_tab_query_values() {
    assert_eq!(serde_json::from_str::<Tab>(r#""roles""#).unwrap(), Tab::Roles);
    assert!(serde_json::from_str::<Tab>(r#""settings""#).is_err());
}

#[test]
fn test_role_summary_flattens_role_fields() {
    let editor = role("editor", true, false);
    let users = vec![
        User {
            id: Uuid::new_v4(),
            role: Some("editor".to_string()),
            ..User::default()
        },
        User {
            id: Uuid::new_v4(),
            role: None,
            ..User::default()
        },
    ];

    let summaries = RoleSummary::summarize(vec![editor, role("superadmin", true, true)], &users);
    let json = serde_json::to_value(&summaries).unwrap();

    assert_eq!(json[0]["name"], "editor");
    assert_eq!(json[0]["user_count"], 1);
    assert_eq!(json[0]["reserved"], false);
    assert_eq!(json[0]["permissions"]["user_management"], true);
    assert_eq!(json[1]["user_count"], 0);
    assert_eq!(json[1]["reserved"], true);
}

// --- Request Normalization ---

#[test]
fn test_user_request_blank_role_is_none() {
    let blank = UserRequest {
        email: "a@example.com".to_string(),
        role: Some(" ".to_string()),
    };
    assert_eq!(blank.normalized_role(), None);

    let padded = UserRequest {
        email: "a@example.com".to_string(),
        role: Some(" editor ".to_string()),
    };
    assert_eq!(padded.normalized_role().as_deref(), Some("editor"));
}

#[test]
fn test_partial_update_skips_absent_fields() {
    let req: UpdatePublisherRequest =
        serde_json::from_str(r#"{ "tags": [], "status": "deactivated" }"#).unwrap();
    assert!(req.name.is_none());
    assert_eq!(req.tags, Some(vec![]));

    let mut publisher = publisher_console::models::Publisher {
        name: "Acme".to_string(),
        tags: vec!["Art".to_string()],
        ..Default::default()
    };
    req.apply(&mut publisher);
    assert_eq!(publisher.name, "Acme");
    assert!(publisher.tags.is_empty());
    assert_eq!(publisher.status, PublisherStatus::Deactivated);
}

// --- Listing Filter ---

#[test]
fn test_filter_paging_bounds() {
    let default = PublisherFilter::default();
    assert_eq!(default.page(), 1);
    assert_eq!(default.per_page(), 10);
    assert_eq!(default.offset(), 0);

    let clamped = PublisherFilter {
        page: Some(0),
        per_page: Some(1000),
        ..PublisherFilter::default()
    };
    assert_eq!(clamped.page(), 1);
    assert_eq!(clamped.per_page(), 100);

    let third = PublisherFilter {
        page: Some(3),
        per_page: Some(20),
        ..PublisherFilter::default()
    };
    assert_eq!(third.offset(), 40);
}

#[test]
fn test_filter_blank_values_mean_no_filter() {
    let filter = PublisherFilter {
        search: Some("   ".to_string()),
        category: Some(String::new()),
        status: Some("ANY".to_string()),
        ..PublisherFilter::default()
    };
    assert_eq!(filter.search_term(), None);
    assert_eq!(filter.category_filter(), None);
    assert_eq!(filter.status_filter(), None);
}

#[test]
fn test_filter_date_bounds_cover_whole_days() {
    let filter = PublisherFilter {
        date_from: NaiveDate::from_ymd_opt(2024, 2, 28),
        date_to: NaiveDate::from_ymd_opt(2024, 2, 29),
        ..PublisherFilter::default()
    };
    assert_eq!(
        filter.created_from().unwrap().to_rfc3339(),
        "2024-02-28T00:00:00+00:00"
    );
    assert_eq!(
        filter.created_before().unwrap().to_rfc3339(),
        "2024-03-01T00:00:00+00:00"
    );
}

// --- Taxonomy ---

#[test]
fn test_slugify_labels() {
    assert_eq!(slugify("Giving back"), "giving-back");
    assert_eq!(slugify("Mah jong"), "mah-jong");
    assert_eq!(slugify("Art"), "art");
}

#[test]
fn test_category_labels_round_trip_through_slugs() {
    assert_eq!(category_label("drop-in-class"), Some("Drop in class"));
    assert_eq!(category_label("not-a-category"), None);

    let vocabulary = taxonomy::taxonomy();
    assert_eq!(vocabulary.max_tags, 3);
    assert_eq!(vocabulary.categories.len(), vocabulary.tags.len());
    assert!(vocabulary.tags.contains(&"Walking club".to_string()));
}
