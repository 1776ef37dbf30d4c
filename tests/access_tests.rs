/// Integration tests for the join/leave state machine.
/// Drives the coordinator and stores directly against an in-memory
/// database, the same way the HTTP layer does.
use jamroom_server::access::{AccessCoordinator, LeaveOutcome};
use jamroom_server::db::invites::InviteStore;
use jamroom_server::db::ledger::MembershipLedger;
use jamroom_server::db::models::{NewRoom, Role, Room, Visibility};
use jamroom_server::db::registry::RoomRegistry;
use jamroom_server::db::{create_test_pool, DbPool};
use jamroom_server::events::{MembershipEvent, MembershipFeed};
use jamroom_server::moderation::{ModerationAction, ModerationAuthority};

async fn create_room(
    pool: &DbPool,
    owner: &str,
    name: &str,
    visibility: Visibility,
    password: Option<&str>,
    capacity: u32,
) -> Room {
    RoomRegistry::create_room(
        pool,
        owner,
        NewRoom {
            name: name.to_string(),
            description: String::new(),
            visibility,
            password: password.map(str::to_string),
            max_participants: capacity,
        },
    )
    .await
    .expect("Failed to create room")
}

#[tokio::test]
async fn test_design_jam_capacity_scenario() {
    let pool = create_test_pool();
    let feed = MembershipFeed::new();

    // Public room, no password, capacity 2; the owner joins automatically
    let room = create_room(&pool, "alice", "Design Jam", Visibility::Public, None, 2).await;
    assert_eq!(
        MembershipLedger::participant_count(&pool, &room.id)
            .await
            .expect("count failed"),
        1
    );

    // User B joins: succeeds, count 2
    AccessCoordinator::join_room(&pool, &feed, &room.code, "bob", None)
        .await
        .expect("bob's join failed");
    assert_eq!(
        MembershipLedger::participant_count(&pool, &room.id)
            .await
            .expect("count failed"),
        2
    );

    // User C joins: room is at capacity
    let err = AccessCoordinator::join_room(&pool, &feed, &room.code, "carol", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "room_full");
    assert_eq!(
        MembershipLedger::participant_count(&pool, &room.id)
            .await
            .expect("count failed"),
        2
    );
}

#[tokio::test]
async fn test_private_password_room_scenario() {
    let pool = create_test_pool();
    let feed = MembershipFeed::new();

    let room = create_room(
        &pool,
        "alice",
        "War Room",
        Visibility::Private,
        Some("s3cret"),
        10,
    )
    .await;

    let check = AccessCoordinator::validate_room_code(&pool, &room.code, None)
        .await
        .expect("validate failed");
    assert!(check.exists);
    assert!(check.requires_password);

    let err = AccessCoordinator::join_room(&pool, &feed, &room.code, "bob", Some("wrong"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_credentials");

    AccessCoordinator::join_room(&pool, &feed, &room.code, "bob", Some("s3cret"))
        .await
        .expect("correct password join failed");
    assert_eq!(
        MembershipLedger::participant_count(&pool, &room.id)
            .await
            .expect("count failed"),
        2
    );
}

#[tokio::test]
async fn test_join_twice_is_idempotent() {
    let pool = create_test_pool();
    let feed = MembershipFeed::new();
    let room = create_room(&pool, "alice", "Design Jam", Visibility::Public, None, 10).await;

    let first = AccessCoordinator::join_room(&pool, &feed, &room.code, "bob", None)
        .await
        .expect("first join failed");
    let second = AccessCoordinator::join_room(&pool, &feed, &room.code, "bob", None)
        .await
        .expect("second join failed");

    assert!(second.already_member);
    assert_eq!(second.membership, first.membership);

    let members = MembershipLedger::list_participants(&pool, &room.id)
        .await
        .expect("list failed");
    assert_eq!(
        members.iter().filter(|p| p.user_id == "bob").count(),
        1,
        "retried join must not duplicate the membership"
    );
}

#[tokio::test]
async fn test_banned_user_join_fails_regardless_of_password() {
    let pool = create_test_pool();
    let feed = MembershipFeed::new();
    let room = create_room(
        &pool,
        "alice",
        "War Room",
        Visibility::Private,
        Some("s3cret"),
        10,
    )
    .await;

    MembershipLedger::ban(&pool, &room.id, "mallory", "alice")
        .await
        .expect("ban failed");

    for password in [None, Some("wrong"), Some("s3cret")] {
        let err = AccessCoordinator::join_room(&pool, &feed, &room.code, "mallory", password)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }
}

#[tokio::test]
async fn test_invite_grant_bypasses_password_within_window() {
    let pool = create_test_pool();
    let feed = MembershipFeed::new();
    let room = create_room(
        &pool,
        "alice",
        "War Room",
        Visibility::Private,
        Some("s3cret"),
        10,
    )
    .await;

    let outcomes = AccessCoordinator::invite_users(&pool, &room.id, "alice", &["bob".into()], 600)
        .await
        .expect("invite failed");
    assert_eq!(outcomes.len(), 1);

    // Invited join needs no password and consumes the grant
    AccessCoordinator::join_room(&pool, &feed, &room.code, "bob", None)
        .await
        .expect("invited join failed");
    assert!(!InviteStore::has_valid(&pool, &room.id, "bob")
        .await
        .expect("has_valid failed"));

    // Once kicked, rejoining requires the password again
    ModerationAuthority::manage_participant(
        &pool,
        &feed,
        &room.id,
        "alice",
        "bob",
        ModerationAction::Kick,
    )
    .await
    .expect("kick failed");
    let err = AccessCoordinator::join_room(&pool, &feed, &room.code, "bob", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_credentials");
}

#[tokio::test]
async fn test_expired_invite_does_not_bypass_password() {
    let pool = create_test_pool();
    let feed = MembershipFeed::new();
    let room = create_room(
        &pool,
        "alice",
        "War Room",
        Visibility::Private,
        Some("s3cret"),
        10,
    )
    .await;

    AccessCoordinator::invite_users(&pool, &room.id, "alice", &["bob".into()], 0)
        .await
        .expect("invite failed");

    let err = AccessCoordinator::join_room(&pool, &feed, &room.code, "bob", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_credentials");
}

#[tokio::test]
async fn test_owner_leave_rules() {
    let pool = create_test_pool();
    let feed = MembershipFeed::new();
    let room = create_room(&pool, "alice", "Design Jam", Visibility::Public, None, 10).await;

    AccessCoordinator::join_room(&pool, &feed, &room.code, "bob", None)
        .await
        .expect("join failed");

    // Owner cannot abandon a room that still has members
    let err = AccessCoordinator::leave_room(&pool, &feed, &room.id, "alice")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "forbidden");

    // After the last other member leaves, the owner's leave deletes the room
    AccessCoordinator::leave_room(&pool, &feed, &room.id, "bob")
        .await
        .expect("bob's leave failed");
    let outcome = AccessCoordinator::leave_room(&pool, &feed, &room.id, "alice")
        .await
        .expect("owner's leave failed");
    assert_eq!(outcome, LeaveOutcome::RoomDeleted);

    let gone = RoomRegistry::find_by_code(&pool, &room.code)
        .await
        .expect("lookup failed");
    assert!(gone.is_none(), "deleted room must not resolve by code");
    assert_eq!(
        MembershipLedger::participant_count(&pool, &room.id)
            .await
            .expect("count failed"),
        0
    );
}

#[tokio::test]
async fn test_exactly_one_owner_at_all_times() {
    let pool = create_test_pool();
    let feed = MembershipFeed::new();
    let room = create_room(&pool, "alice", "Design Jam", Visibility::Public, None, 10).await;

    for user in ["bob", "carol", "dave"] {
        AccessCoordinator::join_room(&pool, &feed, &room.code, user, None)
            .await
            .expect("join failed");
    }
    ModerationAuthority::manage_participant(
        &pool,
        &feed,
        &room.id,
        "alice",
        "bob",
        ModerationAction::Promote,
    )
    .await
    .expect("promote failed");
    ModerationAuthority::manage_participant(
        &pool,
        &feed,
        &room.id,
        "bob",
        "carol",
        ModerationAction::Kick,
    )
    .await
    .expect("kick failed");

    let members = MembershipLedger::list_participants(&pool, &room.id)
        .await
        .expect("list failed");
    let owners: Vec<_> = members.iter().filter(|p| p.role == Role::Owner).collect();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].user_id, room.owner_id);
}

#[tokio::test]
async fn test_membership_feed_reports_each_mutation() {
    let pool = create_test_pool();
    let feed = MembershipFeed::new();
    let mut rx = feed.subscribe();

    let room = create_room(&pool, "alice", "Design Jam", Visibility::Public, None, 10).await;

    AccessCoordinator::join_room(&pool, &feed, &room.code, "bob", None)
        .await
        .expect("join failed");
    // Idempotent retry: no second event
    AccessCoordinator::join_room(&pool, &feed, &room.code, "bob", None)
        .await
        .expect("retry failed");
    AccessCoordinator::leave_room(&pool, &feed, &room.id, "bob")
        .await
        .expect("leave failed");

    assert_eq!(
        rx.recv().await.expect("recv failed"),
        MembershipEvent::Joined {
            room_id: room.id.clone(),
            user_id: "bob".into(),
        }
    );
    assert_eq!(
        rx.recv().await.expect("recv failed"),
        MembershipEvent::Left {
            room_id: room.id.clone(),
            user_id: "bob".into(),
        }
    );
    assert!(
        rx.try_recv().is_err(),
        "no further events should have been published"
    );
}
