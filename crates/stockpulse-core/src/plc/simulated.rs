// ── In-memory PLC ──
//
// Backs `sim://` endpoints and the test suite. Node table starts out with
// the warehouse panel's values; reachability can be flipped at runtime.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::address::NodeAddress;
use super::transport::{PlcEndpoint, PlcSession, PlcTransport, PlcValue, TransportFault};

const BAD_NODE_ID_UNKNOWN: u32 = 0x8034_0000;
const BAD_TYPE_MISMATCH: u32 = 0x8074_0000;

#[derive(Debug)]
struct SimState {
    nodes: DashMap<String, PlcValue>,
    reachable: AtomicBool,
    dials: AtomicU32,
    disconnects: AtomicU32,
}

/// Simulated PLC. Clones share one node table.
#[derive(Debug, Clone)]
pub struct SimulatedPlc {
    state: Arc<SimState>,
}

impl Default for SimulatedPlc {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPlc {
    pub fn new() -> Self {
        let nodes = DashMap::new();
        for (node, value) in [
            ("ns=2;s=ItemCount", PlcValue::Int(0)),
            ("ns=2;s=TrafficLightStatus", PlcValue::from("OFF")),
            ("ns=2;s=HMICommand", PlcValue::from("NONE")),
            ("ns=2;s=HMIStatus", PlcValue::from("IDLE")),
            ("ns=2;s=CategoryData", PlcValue::from("")),
        ] {
            nodes.insert(node.to_owned(), value);
        }

        Self {
            state: Arc::new(SimState {
                nodes,
                reachable: AtomicBool::new(true),
                dials: AtomicU32::new(0),
                disconnects: AtomicU32::new(0),
            }),
        }
    }

    /// A simulator that refuses every dial.
    pub fn unreachable() -> Self {
        let sim = Self::new();
        sim.set_reachable(false);
        sim
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Dial attempts so far, successful or not.
    pub fn dial_count(&self) -> u32 {
        self.state.dials.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> u32 {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    /// Read a node directly, bypassing any session.
    pub fn peek(&self, address: &str) -> Option<PlcValue> {
        self.state.nodes.get(address).map(|v| v.clone())
    }

    /// Create or overwrite a node directly.
    pub fn insert(&self, address: &str, value: PlcValue) {
        self.state.nodes.insert(address.to_owned(), value);
    }
}

#[async_trait]
impl PlcTransport for SimulatedPlc {
    async fn connect(&self, endpoint: &PlcEndpoint) -> Result<Box<dyn PlcSession>, TransportFault> {
        let attempt = self.state.dials.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.state.reachable.load(Ordering::SeqCst) {
            debug!(url = %endpoint.url, attempt, "simulated PLC refused connection");
            return Err(TransportFault::Other(format!(
                "connection refused: {}",
                endpoint.url
            )));
        }
        Ok(Box::new(SimSession {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }
}

#[derive(Debug)]
struct SimSession {
    state: Arc<SimState>,
    closed: AtomicBool,
}

impl SimSession {
    fn check_open(&self) -> Result<(), TransportFault> {
        if self.closed.load(Ordering::SeqCst) || !self.state.reachable.load(Ordering::SeqCst) {
            return Err(TransportFault::Other("session closed".into()));
        }
        Ok(())
    }
}

fn unknown_node() -> TransportFault {
    TransportFault::Status {
        code: BAD_NODE_ID_UNKNOWN,
        name: "BadNodeIdUnknown".into(),
    }
}

#[async_trait]
impl PlcSession for SimSession {
    async fn read_value(&self, node: &NodeAddress) -> Result<PlcValue, TransportFault> {
        self.check_open()?;
        self.state
            .nodes
            .get(&node.to_string())
            .map(|v| v.clone())
            .ok_or_else(unknown_node)
    }

    async fn write_value(&self, node: &NodeAddress, value: &PlcValue) -> Result<(), TransportFault> {
        self.check_open()?;
        let mut slot = self
            .state
            .nodes
            .get_mut(&node.to_string())
            .ok_or_else(unknown_node)?;
        if std::mem::discriminant(&*slot) != std::mem::discriminant(value) {
            return Err(TransportFault::Status {
                code: BAD_TYPE_MISMATCH,
                name: "BadTypeMismatch".into(),
            });
        }
        *slot = value.clone();
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportFault> {
        self.closed.store(true, Ordering::SeqCst);
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
