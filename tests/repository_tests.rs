use chrono::{Duration, NaiveDate, TimeZone, Utc};
use publisher_console::{
    MockRepository,
    error::{StoreError, conflict_message},
    models::{
        Permissions, Publisher, PublisherFilter, PublisherRequest, PublisherStatus, RESERVED_ROLE,
        Role, RoleRequest, UpdatePublisherRequest, User, UserRequest,
    },
    repository::{
        Repository, ensure_role_mutable, ensure_role_name_allowed, ensure_role_reference, role,
    },
};
use uuid::Uuid;

// --- Fixtures ---

fn seeded() -> (MockRepository, Role, Role) {
    let superadmin = role(RESERVED_ROLE, true, true);
    let editor = role("editor", true, false);
    let repo = MockRepository::new().with_roles(vec![superadmin.clone(), editor.clone()]);
    (repo, superadmin, editor)
}

fn role_request(name: &str) -> RoleRequest {
    RoleRequest {
        name: name.to_string(),
        description: Some("test".to_string()),
        permissions: Permissions {
            user_management: true,
            role_management: false,
        },
    }
}

fn publisher(name: &str, days_ago: i64) -> Publisher {
    Publisher {
        id: Uuid::new_v4(),
        name: name.to_string(),
        created_at: Utc::now() - Duration::days(days_ago),
        ..Publisher::default()
    }
}

fn at(y: i32, m: u32, d: u32, h: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

// --- Boundary Checks ---

#[test]
fn test_reserved_role_is_immutable() {
    let reserved = role(RESERVED_ROLE, true, true);
    assert!(matches!(
        ensure_role_mutable(&reserved),
        Err(StoreError::ReservedRole(_))
    ));
    assert!(ensure_role_mutable(&role("editor", false, false)).is_ok());
    assert!(ensure_role_name_allowed(RESERVED_ROLE).is_err());
    assert!(ensure_role_name_allowed("admin").is_ok());
}

#[test]
fn test_role_reference_must_exist_when_written() {
    let roles = vec![role("editor", true, false)];
    assert!(ensure_role_reference(None, &roles).is_ok());
    assert!(ensure_role_reference(Some("editor"), &roles).is_ok());
    assert!(matches!(
        ensure_role_reference(Some("ghost"), &roles),
        Err(StoreError::UnknownRole(name)) if name == "ghost"
    ));
}

// --- Users ---

#[tokio::test]
async fn test_create_user_with_known_role() {
    let (repo, _, _) = seeded();
    let id = Uuid::new_v4();

    let user = repo
        .create_user(
            id,
            UserRequest {
                email: "a@example.com".to_string(),
                role: Some("editor".to_string()),
            },
        )
        .await
        .unwrap();

    assert_eq!(user.id, id);
    assert_eq!(user.role.as_deref(), Some("editor"));
    assert_eq!(repo.get_user(id).await.unwrap(), Some(user.clone()));
    assert_eq!(repo.get_user_by_email("a@example.com").await.unwrap(), Some(user));
}

#[tokio::test]
async fn test_create_user_with_unknown_role_is_rejected() {
    let (repo, _, _) = seeded();

    let result = repo
        .create_user(
            Uuid::new_v4(),
            UserRequest {
                email: "a@example.com".to_string(),
                role: Some("ghost".to_string()),
            },
        )
        .await;

    assert!(matches!(result, Err(StoreError::UnknownRole(_))));
    assert!(repo.list_users().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_blank_role_means_no_role() {
    let (repo, _, _) = seeded();

    let user = repo
        .create_user(
            Uuid::new_v4(),
            UserRequest {
                email: "a@example.com".to_string(),
                role: Some("  ".to_string()),
            },
        )
        .await
        .unwrap();

    assert_eq!(user.role, None);
}

#[tokio::test]
async fn test_duplicate_email_conflicts() {
    let (repo, _, _) = seeded();
    let req = UserRequest {
        email: "a@example.com".to_string(),
        role: None,
    };
    repo.create_user(Uuid::new_v4(), req.clone()).await.unwrap();

    let result = repo.create_user(Uuid::new_v4(), req).await;

    match result {
        Err(StoreError::Conflict(message)) => {
            assert_eq!(message, "A user with that email already exists")
        }
        other => panic!("expected a conflict, got {:?}", other),
    }
}

#[test]
fn test_conflict_messages_never_leak_constraint_names() {
    assert_eq!(
        conflict_message(Some("users_email_key")),
        "A user with that email already exists"
    );
    assert_eq!(
        conflict_message(Some("roles_name_key")),
        "A role with that name already exists"
    );
    assert_eq!(
        conflict_message(Some("publishers_pkey")),
        "A record with that name already exists"
    );
    assert_eq!(conflict_message(None), "A record with that name already exists");
}

#[tokio::test]
async fn test_dangling_role_survives_reads() {
    // Only writes validate; a stored dangling reference is still readable.
    let id = Uuid::new_v4();
    let repo = MockRepository::new().with_users(vec![User {
        id,
        email: "old@example.com".to_string(),
        role: Some("retired".to_string()),
        ..User::default()
    }]);

    let user = repo.get_user(id).await.unwrap().unwrap();
    assert_eq!(user.role.as_deref(), Some("retired"));
}

#[tokio::test]
async fn test_update_and_delete_user() {
    let (repo, _, _) = seeded();
    let id = Uuid::new_v4();
    repo.create_user(
        id,
        UserRequest {
            email: "a@example.com".to_string(),
            role: None,
        },
    )
    .await
    .unwrap();

    let updated = repo
        .update_user(
            id,
            UserRequest {
                email: "b@example.com".to_string(),
                role: Some("editor".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.email, "b@example.com");
    assert_eq!(updated.role.as_deref(), Some("editor"));

    repo.delete_user(id).await.unwrap();
    assert!(matches!(repo.delete_user(id).await, Err(StoreError::NotFound)));
    assert!(matches!(
        repo.update_user(id, UserRequest::default()).await,
        Err(StoreError::NotFound)
    ));
}

#[tokio::test]
async fn test_users_listed_newest_first() {
    let older = User {
        id: Uuid::new_v4(),
        email: "older@example.com".to_string(),
        created_at: at(2024, 1, 1, 0),
        ..User::default()
    };
    let newer = User {
        id: Uuid::new_v4(),
        email: "newer@example.com".to_string(),
        created_at: at(2024, 6, 1, 0),
        ..User::default()
    };
    let repo = MockRepository::new().with_users(vec![older, newer]);

    let users = repo.list_users().await.unwrap();

    assert_eq!(users[0].email, "newer@example.com");
    assert_eq!(users[1].email, "older@example.com");
}

// --- Roles ---

#[tokio::test]
async fn test_roles_listed_by_name() {
    let (repo, _, _) = seeded();
    repo.create_role(role_request("auditor")).await.unwrap();

    let names: Vec<String> = repo
        .list_roles()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();

    assert_eq!(names, vec!["auditor", "editor", RESERVED_ROLE]);
}

#[tokio::test]
async fn test_create_role_rejects_reserved_and_duplicate_names() {
    let (repo, _, _) = seeded();

    assert!(matches!(
        repo.create_role(role_request(RESERVED_ROLE)).await,
        Err(StoreError::ReservedRole(_))
    ));
    assert!(matches!(
        repo.create_role(role_request("editor")).await,
        Err(StoreError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_reserved_role_cannot_be_updated_or_deleted() {
    let (repo, superadmin, _) = seeded();

    assert!(matches!(
        repo.update_role(superadmin.id, role_request("root")).await,
        Err(StoreError::ReservedRole(_))
    ));
    assert!(matches!(
        repo.delete_role(superadmin.id).await,
        Err(StoreError::ReservedRole(_))
    ));
    assert!(
        repo.list_roles()
            .await
            .unwrap()
            .iter()
            .any(|r| r.name == RESERVED_ROLE)
    );
}

#[tokio::test]
async fn test_no_role_can_be_renamed_to_reserved() {
    let (repo, _, editor) = seeded();

    assert!(matches!(
        repo.update_role(editor.id, role_request(RESERVED_ROLE)).await,
        Err(StoreError::ReservedRole(_))
    ));
}

#[tokio::test]
async fn test_role_rename_carries_users_along() {
    let (repo, _, editor) = seeded();
    let id = Uuid::new_v4();
    repo.create_user(
        id,
        UserRequest {
            email: "a@example.com".to_string(),
            role: Some("editor".to_string()),
        },
    )
    .await
    .unwrap();

    let renamed = repo.update_role(editor.id, role_request("writer")).await.unwrap();

    assert_eq!(renamed.name, "writer");
    assert_eq!(
        repo.get_user(id).await.unwrap().unwrap().role.as_deref(),
        Some("writer")
    );
}

#[tokio::test]
async fn test_deleting_role_leaves_dangling_references() {
    let (repo, _, editor) = seeded();
    let id = Uuid::new_v4();
    repo.create_user(
        id,
        UserRequest {
            email: "a@example.com".to_string(),
            role: Some("editor".to_string()),
        },
    )
    .await
    .unwrap();

    repo.delete_role(editor.id).await.unwrap();

    assert_eq!(repo.get_role(editor.id).await.unwrap(), None);
    assert_eq!(
        repo.get_user(id).await.unwrap().unwrap().role.as_deref(),
        Some("editor")
    );
    assert!(matches!(repo.delete_role(editor.id).await, Err(StoreError::NotFound)));
}

// --- Publishers ---

#[tokio::test]
async fn test_publisher_create_defaults_to_active() {
    let repo = MockRepository::new();

    let created = repo
        .create_publisher(PublisherRequest {
            name: "Acme Press".to_string(),
            tags: vec!["Books".to_string()],
            ..PublisherRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(created.status, PublisherStatus::Active);
    assert_eq!(created.events_count, 0);
    assert_eq!(repo.get_publisher(created.id).await.unwrap(), Some(created));
}

#[tokio::test]
async fn test_publisher_partial_update_only_touches_given_fields() {
    let mut existing = publisher("Acme", 1);
    existing.city = Some("Lagos".to_string());
    existing.description = Some("Old".to_string());
    let id = existing.id;
    let repo = MockRepository::new().with_publishers(vec![existing]);

    let updated = repo
        .update_publisher(
            id,
            UpdatePublisherRequest {
                description: Some("New".to_string()),
                status: Some(PublisherStatus::Deactivated),
                ..UpdatePublisherRequest::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.name, "Acme");
    assert_eq!(updated.city.as_deref(), Some("Lagos"));
    assert_eq!(updated.description.as_deref(), Some("New"));
    assert_eq!(updated.status, PublisherStatus::Deactivated);
}

#[tokio::test]
async fn test_concurrent_partial_updates_both_land() {
    let existing = publisher("Acme", 1);
    let id = existing.id;
    let repo = MockRepository::new().with_publishers(vec![existing]);

    let rename = UpdatePublisherRequest {
        name: Some("Acme Press".to_string()),
        ..UpdatePublisherRequest::default()
    };
    let retag = UpdatePublisherRequest {
        tags: Some(vec!["Art".to_string()]),
        ..UpdatePublisherRequest::default()
    };
    let (a, b) = tokio::join!(
        repo.update_publisher(id, rename),
        repo.update_publisher(id, retag)
    );
    a.unwrap();
    b.unwrap();

    let stored = repo.get_publisher(id).await.unwrap().unwrap();
    assert_eq!(stored.name, "Acme Press");
    assert_eq!(stored.tags, vec!["Art".to_string()]);
}

#[tokio::test]
async fn test_publisher_missing_is_not_found() {
    let repo = MockRepository::new();
    let id = Uuid::new_v4();

    assert_eq!(repo.get_publisher(id).await.unwrap(), None);
    assert!(matches!(
        repo.update_publisher(id, UpdatePublisherRequest::default()).await,
        Err(StoreError::NotFound)
    ));
    assert!(matches!(repo.delete_publisher(id).await, Err(StoreError::NotFound)));
}

#[tokio::test]
async fn test_publisher_pagination_newest_first() {
    let publishers: Vec<Publisher> = (0..25).map(|i| publisher(&format!("P{}", i), i)).collect();
    let repo = MockRepository::new().with_publishers(publishers);

    let first = repo.list_publishers(&PublisherFilter::default()).await.unwrap();
    assert_eq!(first.items.len(), 10);
    assert_eq!(first.total, 25);
    assert_eq!(first.total_pages, 3);
    assert_eq!(first.page, 1);
    assert_eq!(first.items[0].name, "P0");

    let last = repo
        .list_publishers(&PublisherFilter {
            page: Some(3),
            ..PublisherFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(last.items.len(), 5);
    assert_eq!(last.items[4].name, "P24");

    let beyond = repo
        .list_publishers(&PublisherFilter {
            page: Some(9),
            ..PublisherFilter::default()
        })
        .await
        .unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total, 25);
}

#[tokio::test]
async fn test_publisher_search_and_filters() {
    let mut a = publisher("Acme Press", 3);
    a.category = Some("books".to_string());
    let mut b = publisher("Beta", 2);
    b.contact_name = Some("Ada ACME-Lovelace".to_string());
    b.category = Some("music".to_string());
    b.status = PublisherStatus::Deactivated;
    let mut c = publisher("Gamma", 1);
    c.description = Some("nothing to see".to_string());
    c.category = Some("books".to_string());
    let repo = MockRepository::new().with_publishers(vec![a, b, c]);

    let search = repo
        .list_publishers(&PublisherFilter {
            search: Some("acme".to_string()),
            ..PublisherFilter::default()
        })
        .await
        .unwrap();
    let names: Vec<&str> = search.items.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Beta", "Acme Press"]);

    let books = repo
        .list_publishers(&PublisherFilter {
            category: Some("books".to_string()),
            status: Some("Any".to_string()),
            ..PublisherFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(books.total, 2);

    let deactivated = repo
        .list_publishers(&PublisherFilter {
            status: Some("deactivated".to_string()),
            ..PublisherFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(deactivated.total, 1);
    assert_eq!(deactivated.items[0].name, "Beta");
}

#[tokio::test]
async fn test_publisher_date_range_is_inclusive() {
    let mut early = publisher("Early", 0);
    early.created_at = at(2024, 3, 1, 0);
    let mut late_in_day = publisher("LateInDay", 0);
    late_in_day.created_at = at(2024, 3, 10, 23);
    let mut after = publisher("After", 0);
    after.created_at = at(2024, 3, 11, 0);
    let repo = MockRepository::new().with_publishers(vec![early, late_in_day, after]);

    let page = repo
        .list_publishers(&PublisherFilter {
            date_from: NaiveDate::from_ymd_opt(2024, 3, 1),
            date_to: NaiveDate::from_ymd_opt(2024, 3, 10),
            ..PublisherFilter::default()
        })
        .await
        .unwrap();

    let names: Vec<&str> = page.items.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["LateInDay", "Early"]);
}

#[tokio::test]
async fn test_publisher_categories_are_distinct_and_sorted() {
    let mut a = publisher("A", 1);
    a.category = Some("music".to_string());
    let mut b = publisher("B", 2);
    b.category = Some("books".to_string());
    let mut c = publisher("C", 3);
    c.category = Some("music".to_string());
    let mut d = publisher("D", 4);
    d.category = Some(String::new());
    let repo = MockRepository::new().with_publishers(vec![a, b, c, d, publisher("E", 5)]);

    assert_eq!(
        repo.publisher_categories().await.unwrap(),
        vec!["books".to_string(), "music".to_string()]
    );
}
