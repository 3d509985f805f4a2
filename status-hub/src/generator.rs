//! Synthetic producer that feeds random cluster status snapshots into the hub.
//!
//! Useful for exercising the viewer page without a real producer attached.
//! Payload shape is a convention between this generator and the page; the
//! hub never looks inside.

use std::{future::Future, time::Duration};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::{select, time::MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::hub::Hub;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1500);

const NODE_COUNT: i64 = 16;
const OFFLINE_NODES: [i64; 2] = [3, 7];
const MEM_LIMIT: i64 = 100_000;
const MAX_TASK_THROUGHPUT: i64 = 100;
const NETWORK_LIMIT: i64 = 100_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusSnapshot {
    pub time: i64,
    pub nodes: Vec<NodeStatus>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Online,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeStatus {
    pub id: i64,
    pub state: NodeState,
    pub cpu_load: f64,
    pub mem_load: i64,
    pub task_throughput: i64,
    // Wire name kept as existing viewer pages spell it.
    #[serde(rename = "weighted_task_througput")]
    pub weighted_task_throughput: f64,
    pub network_in: i64,
    pub network_out: i64,
    pub idle_rate: f64,
}

pub fn random_snapshot<R: Rng>(rng: &mut R, time: i64) -> StatusSnapshot {
    StatusSnapshot {
        time,
        nodes: (0..NODE_COUNT).map(|id| random_node(rng, id)).collect(),
    }
}

fn random_node<R: Rng>(rng: &mut R, id: i64) -> NodeStatus {
    let state = if OFFLINE_NODES.contains(&id) {
        NodeState::Offline
    } else {
        NodeState::Online
    };

    NodeStatus {
        id,
        state,
        cpu_load: rng.gen(),
        mem_load: rng.gen_range(0..MEM_LIMIT),
        task_throughput: rng.gen_range(0..MAX_TASK_THROUGHPUT),
        weighted_task_throughput: rng.gen::<f64>() * 10.0,
        network_in: rng.gen_range(0..NETWORK_LIMIT),
        network_out: rng.gen_range(0..NETWORK_LIMIT),
        idle_rate: rng.gen(),
    }
}

fn encode_snapshot(time: i64) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&random_snapshot(&mut rand::thread_rng(), time))
}

/// Submits one snapshot per `interval` until `shutdown` resolves.
pub async fn run<F>(hub: Hub, interval: Duration, shutdown: F)
where
    F: Future<Output = ()> + Send,
{
    info!(?interval, "starting random message generator");
    tokio::pin!(shutdown);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut time = 1;

    loop {
        select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let payload = match encode_snapshot(time) {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(error = %err, "could not encode status snapshot");
                        break;
                    }
                };
                let outcome = hub.submit(payload).await;
                debug!(time, delivered = outcome.delivered, "status snapshot submitted");
                time += 1;
            }
        }
    }

    info!("random message generator stopped");
}
