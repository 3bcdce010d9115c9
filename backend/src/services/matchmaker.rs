use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{ConnectError, ConnectResult};
use crate::models::{ConnectionRequest, RequestStatus};
use crate::store::ConnectStore;

/// Whether two searching requests may be paired: distinct users, exact
/// location equality, and at least one shared interest tag.
pub fn compatible(a: &ConnectionRequest, b: &ConnectionRequest) -> bool {
    a.user_id != b.user_id
        && a.status == RequestStatus::Searching
        && b.status == RequestStatus::Searching
        && a.location == b.location
        && a.interests.iter().any(|tag| b.interests.contains(tag))
}

/// Greedy pairing over requests sorted oldest-first: each request is paired
/// with the earliest-created compatible peer still available, at most once
/// per round.
pub fn find_pairs(requests: &[ConnectionRequest]) -> Vec<(Uuid, Uuid)> {
    let mut taken: HashSet<Uuid> = HashSet::new();
    let mut pairs = Vec::new();

    for (i, request) in requests.iter().enumerate() {
        if taken.contains(&request.user_id) {
            continue;
        }
        for candidate in &requests[i + 1..] {
            if taken.contains(&candidate.user_id) {
                continue;
            }
            if compatible(request, candidate) {
                taken.insert(request.user_id);
                taken.insert(candidate.user_id);
                pairs.push((request.user_id, candidate.user_id));
                break;
            }
        }
    }

    pairs
}

/// One matchmaker sweep: pair every compatible couple among the currently
/// searching requests. Returns how many connections were created. A conflict
/// on an individual pair means another matcher (or a cancel) got there
/// first; it is skipped, not fatal.
pub async fn run_matchmaker_once<S: ConnectStore>(store: &S) -> ConnectResult<usize> {
    let searching = store.list_searching_requests().await?;
    let pairs = find_pairs(&searching);

    let mut created = 0;
    for (user1_id, user2_id) in pairs {
        match store.create_connection(user1_id, user2_id).await {
            Ok(connection) => {
                tracing::info!(
                    "Paired users {} and {} into connection {}",
                    user1_id,
                    user2_id,
                    connection.id
                );
                created += 1;
            }
            Err(ConnectError::Conflict(reason)) => {
                tracing::info!("Skipping pair {} / {}: {}", user1_id, user2_id, reason);
            }
            Err(e) => {
                tracing::error!("Failed to pair {} / {}: {}", user1_id, user2_id, e);
            }
        }
    }

    Ok(created)
}
