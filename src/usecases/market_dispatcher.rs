//! Per-market serial execution lanes.
//!
//! One bounded single-consumer queue per market, each drained by a
//! dedicated long-lived worker task that drives the executor. Trades within
//! a market run in strict FIFO order; trades across markets run in
//! parallel. Lanes are created on the first trade for a market and live
//! for the life of the process.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{info, instrument};

use crate::domain::error::{EngineError, Result};
use crate::domain::order::{Order, TradeRequest};
use crate::ports::storage::Storage;

use super::order_executor::OrderExecutor;

struct LaneJob {
    request: TradeRequest,
    reply: oneshot::Sender<Result<Order>>,
}

pub struct MarketDispatcher<S: Storage> {
    executor: Arc<OrderExecutor<S>>,
    lanes: Mutex<HashMap<String, mpsc::Sender<LaneJob>>>,
    lane_depth: usize,
}

impl<S: Storage> MarketDispatcher<S> {
    pub fn new(executor: Arc<OrderExecutor<S>>, lane_depth: usize) -> Self {
        Self {
            executor,
            lanes: Mutex::new(HashMap::new()),
            lane_depth,
        }
    }

    /// Enqueue a trade on its market's lane and wait for the result.
    #[instrument(skip(self, request), fields(market_id = %request.market_id))]
    pub async fn submit(&self, request: TradeRequest) -> Result<Order> {
        let lane = self.lane_for(&request.market_id).await;
        let (reply_tx, reply_rx) = oneshot::channel();
        lane.send(LaneJob {
            request,
            reply: reply_tx,
        })
        .await
        .map_err(|_| EngineError::Execution("market lane is closed".to_string()))?;

        reply_rx
            .await
            .map_err(|_| EngineError::Execution("market lane dropped the request".to_string()))?
    }

    /// Sender for the market's lane, spawning the lane worker on first use.
    async fn lane_for(&self, market_id: &str) -> mpsc::Sender<LaneJob> {
        let mut lanes = self.lanes.lock().await;
        if let Some(sender) = lanes.get(market_id) {
            return sender.clone();
        }

        let (sender, mut receiver) = mpsc::channel::<LaneJob>(self.lane_depth);
        let executor = Arc::clone(&self.executor);
        let lane_market = market_id.to_string();
        tokio::spawn(async move {
            info!(market_id = %lane_market, "Market lane worker started");
            while let Some(job) = receiver.recv().await {
                let result = executor.execute_market_order(&job.request).await;
                // A dropped reply receiver just means the caller went away.
                let _ = job.reply.send(result);
            }
            info!(market_id = %lane_market, "Market lane worker stopped");
        });

        lanes.insert(market_id.to_string(), sender.clone());
        sender
    }

    /// Number of live lanes (markets that have seen at least one trade).
    pub async fn lane_count(&self) -> usize {
        self.lanes.lock().await.len()
    }
}
