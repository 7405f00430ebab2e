//! Scripted service double used across the crate's tests.
//!
//! Records every call in order and lets tests inject failures per
//! operation. Defaults to succeeding: setups get increasing indices,
//! `load_setup` hands out ids offset by 1000, the session id is fixed.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::events::dispatcher::StreamSink;
use crate::service::handle::ServiceHandle;
use crate::service::types::{GestureInfo, HostDescriptor, SessionSummary, TrackerPose};
use crate::skeleton::draft::{Chain, Collider, MeshSetup, Node, SetupSummary};

pub(crate) const MOCK_SESSION_ID: u32 = 42;

#[derive(Default)]
pub(crate) struct MockService {
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<&'static str, VecDeque<ServiceError>>>,
    next_setup_index: AtomicU32,
    connected: AtomicBool,
    pub(crate) hosts: Mutex<Vec<HostDescriptor>>,
    pub(crate) stored_nodes: Mutex<Vec<Node>>,
    pub(crate) stored_chains: Mutex<Vec<Chain>>,
    pub(crate) stored_colliders: Mutex<Vec<Collider>>,
    pub(crate) sessions: Mutex<Vec<SessionSummary>>,
    pub(crate) gestures: Mutex<Vec<GestureInfo>>,
}

impl MockService {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Scripts the next call to `op` to fail with `err`.
    pub(crate) fn fail_next(&self, op: &'static str, err: ServiceError) {
        self.failures
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(err);
    }

    /// Calls recorded so far, like `"add_node:2"`.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_named(&self, op: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.split(':').next() == Some(op))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn scripted(&self, op: &'static str) -> Result<(), ServiceError> {
        match self
            .failures
            .lock()
            .unwrap()
            .get_mut(op)
            .and_then(VecDeque::pop_front)
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ServiceHandle for MockService {
    async fn initialize(&self) -> Result<(), ServiceError> {
        self.record("initialize".into());
        self.scripted("initialize")
    }

    async fn shutdown(&self) -> Result<(), ServiceError> {
        self.record("shutdown".into());
        self.connected.store(false, Ordering::SeqCst);
        self.scripted("shutdown")
    }

    async fn discover_hosts(
        &self,
        _wait: Duration,
        local_only: bool,
    ) -> Result<Vec<HostDescriptor>, ServiceError> {
        self.record(format!("discover_hosts:{local_only}"));
        self.scripted("discover_hosts")?;
        Ok(self.hosts.lock().unwrap().clone())
    }

    async fn connect(&self, host: &HostDescriptor) -> Result<(), ServiceError> {
        self.record(format!("connect:{}", host.name));
        self.scripted("connect")?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn connect_default_transport(&self) -> Result<(), ServiceError> {
        self.record("connect_default_transport".into());
        self.scripted("connect_default_transport")?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ServiceError> {
        self.record("disconnect".into());
        self.connected.store(false, Ordering::SeqCst);
        self.scripted("disconnect")
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn attach_streams(&self, _sink: StreamSink) -> Result<(), ServiceError> {
        self.record("attach_streams".into());
        self.scripted("attach_streams")
    }

    async fn session_id(&self) -> Result<u32, ServiceError> {
        self.record("session_id".into());
        self.scripted("session_id")?;
        Ok(MOCK_SESSION_ID)
    }

    async fn session_summaries(&self) -> Result<Vec<SessionSummary>, ServiceError> {
        self.record("session_summaries".into());
        self.scripted("session_summaries")?;
        Ok(self.sessions.lock().unwrap().clone())
    }

    async fn gesture_catalog(&self) -> Result<Vec<GestureInfo>, ServiceError> {
        self.record("gesture_catalog".into());
        self.scripted("gesture_catalog")?;
        Ok(self.gestures.lock().unwrap().clone())
    }

    async fn create_setup(&self, summary: &SetupSummary) -> Result<u32, ServiceError> {
        self.record(format!("create_setup:{}", summary.name));
        self.scripted("create_setup")?;
        Ok(self.next_setup_index.fetch_add(1, Ordering::SeqCst))
    }

    async fn overwrite_setup(
        &self,
        setup_index: u32,
        summary: &SetupSummary,
    ) -> Result<(), ServiceError> {
        self.record(format!("overwrite_setup:{setup_index}:{}", summary.name));
        self.scripted("overwrite_setup")
    }

    async fn add_node(&self, setup_index: u32, node: &Node) -> Result<(), ServiceError> {
        self.record(format!("add_node:{setup_index}:{}", node.id));
        self.scripted("add_node")
    }

    async fn add_chain(&self, setup_index: u32, chain: &Chain) -> Result<(), ServiceError> {
        self.record(format!("add_chain:{setup_index}:{}", chain.id));
        self.scripted("add_chain")
    }

    async fn add_collider(
        &self,
        setup_index: u32,
        collider: &Collider,
    ) -> Result<(), ServiceError> {
        self.record(format!("add_collider:{setup_index}:{}", collider.node_id));
        self.scripted("add_collider")
    }

    async fn add_mesh(&self, setup_index: u32, mesh: &MeshSetup) -> Result<(), ServiceError> {
        self.record(format!("add_mesh:{setup_index}:{}", mesh.node_id));
        self.scripted("add_mesh")
    }

    async fn allocate_chains(&self, setup_index: u32) -> Result<(), ServiceError> {
        self.record(format!("allocate_chains:{setup_index}"));
        self.scripted("allocate_chains")
    }

    async fn prepare_setup(&self, setup_index: u32) -> Result<(), ServiceError> {
        self.record(format!("prepare_setup:{setup_index}"));
        self.scripted("prepare_setup")
    }

    async fn load_setup(&self, setup_index: u32) -> Result<u32, ServiceError> {
        self.record(format!("load_setup:{setup_index}"));
        self.scripted("load_setup")?;
        Ok(1000 + setup_index)
    }

    async fn unload_skeleton(&self, skeleton_id: u32) -> Result<(), ServiceError> {
        self.record(format!("unload_skeleton:{skeleton_id}"));
        self.scripted("unload_skeleton")
    }

    async fn setup_nodes(&self, setup_index: u32) -> Result<Vec<Node>, ServiceError> {
        self.record(format!("setup_nodes:{setup_index}"));
        self.scripted("setup_nodes")?;
        Ok(self.stored_nodes.lock().unwrap().clone())
    }

    async fn setup_chains(&self, setup_index: u32) -> Result<Vec<Chain>, ServiceError> {
        self.record(format!("setup_chains:{setup_index}"));
        self.scripted("setup_chains")?;
        Ok(self.stored_chains.lock().unwrap().clone())
    }

    async fn setup_colliders(&self, setup_index: u32) -> Result<Vec<Collider>, ServiceError> {
        self.record(format!("setup_colliders:{setup_index}"));
        self.scripted("setup_colliders")?;
        Ok(self.stored_colliders.lock().unwrap().clone())
    }

    async fn save_temporary_skeleton(
        &self,
        setup_index: u32,
        session_id: u32,
        is_update: bool,
    ) -> Result<(), ServiceError> {
        self.record(format!(
            "save_temporary_skeleton:{setup_index}:{session_id}:{is_update}"
        ));
        self.scripted("save_temporary_skeleton")
    }

    async fn stage_temporary_skeleton(
        &self,
        setup_index: u32,
        session_id: u32,
    ) -> Result<(), ServiceError> {
        self.record(format!(
            "stage_temporary_skeleton:{setup_index}:{session_id}"
        ));
        self.scripted("stage_temporary_skeleton")
    }

    async fn clear_all_temporary_skeletons(&self) -> Result<(), ServiceError> {
        self.record("clear_all_temporary_skeletons".into());
        self.scripted("clear_all_temporary_skeletons")
    }

    async fn compress_temporary_skeleton(
        &self,
        setup_index: u32,
        session_id: u32,
    ) -> Result<Vec<u8>, ServiceError> {
        self.record(format!(
            "compress_temporary_skeleton:{setup_index}:{session_id}"
        ));
        self.scripted("compress_temporary_skeleton")?;
        Ok(vec![0xC0, 0xDE])
    }

    async fn decompress_temporary_skeleton(
        &self,
        setup_index: u32,
        data: &[u8],
    ) -> Result<(), ServiceError> {
        self.record(format!(
            "decompress_temporary_skeleton:{setup_index}:{}",
            data.len()
        ));
        self.scripted("decompress_temporary_skeleton")
    }

    async fn register_tracker(&self, tracker_id: &str) -> Result<(), ServiceError> {
        self.record(format!("register_tracker:{tracker_id}"));
        self.scripted("register_tracker")
    }

    async fn unregister_tracker(&self, tracker_id: &str) -> Result<(), ServiceError> {
        self.record(format!("unregister_tracker:{tracker_id}"));
        self.scripted("unregister_tracker")
    }

    async fn send_tracker_poses(&self, poses: &[TrackerPose]) -> Result<(), ServiceError> {
        self.record(format!("send_tracker_poses:{}", poses.len()));
        self.scripted("send_tracker_poses")
    }
}
