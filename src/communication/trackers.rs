//! Request Trackers: in-memory correlation tables for shutdown and
//! plan-approval request/response protocol traffic.
//!
//! Grounded on `original_source/backend/app/team/state.py`
//! (`shutdown_requests`, `plan_requests`, `tracker_lock`, 8-hex ids).
//! No timeout: stale entries simply linger, matching spec §4.6.

use crate::session::tracer::Tracer;
use crate::types::{PlanRequest, RequestStatus, ShutdownRequest};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct RequestTrackers {
    shutdown_requests: Mutex<HashMap<String, ShutdownRequest>>,
    plan_requests: Mutex<HashMap<String, PlanRequest>>,
}

impl RequestTrackers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit_shutdown(&self, target: &str) -> String {
        let id = Tracer::new_run_id();
        self.shutdown_requests.lock().unwrap().insert(
            id.clone(),
            ShutdownRequest {
                target: target.to_string(),
                status: RequestStatus::Pending,
            },
        );
        id
    }

    pub fn resolve_shutdown(&self, request_id: &str, approve: bool) -> bool {
        let mut map = self.shutdown_requests.lock().unwrap();
        if let Some(entry) = map.get_mut(request_id) {
            entry.status = if approve {
                RequestStatus::Approved
            } else {
                RequestStatus::Rejected
            };
            true
        } else {
            false
        }
    }

    pub fn shutdown_status(&self, request_id: &str) -> Option<RequestStatus> {
        self.shutdown_requests
            .lock()
            .unwrap()
            .get(request_id)
            .map(|r| r.status)
    }

    pub fn submit_plan(&self, from: &str, plan: &str) -> String {
        let id = Tracer::new_run_id();
        self.plan_requests.lock().unwrap().insert(
            id.clone(),
            PlanRequest {
                from: from.to_string(),
                plan: plan.to_string(),
                status: RequestStatus::Pending,
            },
        );
        id
    }

    pub fn resolve_plan(&self, request_id: &str, approve: bool) -> bool {
        let mut map = self.plan_requests.lock().unwrap();
        if let Some(entry) = map.get_mut(request_id) {
            entry.status = if approve {
                RequestStatus::Approved
            } else {
                RequestStatus::Rejected
            };
            true
        } else {
            false
        }
    }

    pub fn plan_status(&self, request_id: &str) -> Option<RequestStatus> {
        self.plan_requests
            .lock()
            .unwrap()
            .get(request_id)
            .map(|r| r.status)
    }

    /// The teammate who submitted a plan request, needed to route the
    /// lead's approval response back to its inbox.
    pub fn plan_sender(&self, request_id: &str) -> Option<String> {
        self.plan_requests
            .lock()
            .unwrap()
            .get(request_id)
            .map(|r| r.from.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_round_trip() {
        let trackers = RequestTrackers::new();
        let id = trackers.submit_shutdown("alice");
        assert_eq!(trackers.shutdown_status(&id), Some(RequestStatus::Pending));
        assert!(trackers.resolve_shutdown(&id, true));
        assert_eq!(trackers.shutdown_status(&id), Some(RequestStatus::Approved));
    }

    #[test]
    fn unknown_request_id_resolve_is_noop() {
        let trackers = RequestTrackers::new();
        assert!(!trackers.resolve_shutdown("deadbeef", true));
        assert_eq!(trackers.shutdown_status("deadbeef"), None);
    }

    #[test]
    fn plan_request_tracks_submitter_and_plan() {
        let trackers = RequestTrackers::new();
        let id = trackers.submit_plan("bob", "do the thing");
        assert!(trackers.resolve_plan(&id, false));
        assert_eq!(trackers.plan_status(&id), Some(RequestStatus::Rejected));
    }
}
