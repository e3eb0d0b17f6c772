//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Thread worker that owns the Exchange and serializes every operation on it. Callers talk to it
// through a cloneable client over a bounded channel; each command carries a oneshot sender for
// its reply.
//
// | Component        | Description                                                 |
// |------------------|-------------------------------------------------------------|
// | ExchangeWorker   | Worker thread owning the Exchange                           |
// | ExchangeClient   | Cloneable async handle to the worker                        |
// | ExchangeCommand  | Commands sent to the worker                                 |
// | WorkerError      | Channel failures and exchange errors seen by a client       |
//
//--------------------------------------------------------------------------------------------------

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::oneshot;
use tracing::{error, info};
use uuid::Uuid;

use super::{
    Exchange, ExchangeError, ExchangeResult, MarketDeletion, MarketListing, OrderOutcome, OrderStore,
};
use crate::domain::models::orderbook::MarketBookSnapshot;
use crate::domain::models::position::PositionSummary;
use crate::domain::models::types::{Market, MarketStatus, Order, OrderRecord, Trade};
use crate::domain::services::market_maker::MarketMakerStatus;
use crate::domain::services::settlement::{
    LeaderboardEntry, MarketHistoryEntry, MarketSettlementSummary,
};

const COMMAND_CHANNEL_CAPACITY: usize = 1000;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkerError {
    #[error("Exchange worker channel closed")]
    Send,

    #[error("Failed to receive response from exchange worker")]
    Receive,

    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

type Reply<T> = oneshot::Sender<T>;

/// Commands that can be sent to the ExchangeWorker
enum ExchangeCommand {
    OpenAccount {
        user_id: Uuid,
        response_tx: Reply<ExchangeResult<Decimal>>,
    },
    Deposit {
        user_id: Uuid,
        amount: Decimal,
        response_tx: Reply<ExchangeResult<Decimal>>,
    },
    Balance {
        user_id: Uuid,
        response_tx: Reply<Option<Decimal>>,
    },
    CreateMarket {
        question: String,
        response_tx: Reply<ExchangeResult<Market>>,
    },
    CloseMarket {
        market_id: Uuid,
        response_tx: Reply<ExchangeResult<usize>>,
    },
    ResolveMarket {
        market_id: Uuid,
        outcome: bool,
        response_tx: Reply<ExchangeResult<MarketSettlementSummary>>,
    },
    DeleteMarket {
        market_id: Uuid,
        refund: bool,
        response_tx: Reply<ExchangeResult<MarketDeletion>>,
    },
    ListMarkets {
        status: Option<MarketStatus>,
        limit: usize,
        response_tx: Reply<Vec<MarketListing>>,
    },
    SubmitOrder {
        order: Order,
        response_tx: Reply<ExchangeResult<OrderOutcome>>,
    },
    CancelOrder {
        user_id: Uuid,
        order_id: Uuid,
        response_tx: Reply<ExchangeResult<OrderRecord>>,
    },
    GetOrder {
        order_id: Uuid,
        response_tx: Reply<Option<OrderRecord>>,
    },
    OrdersForUser {
        user_id: Uuid,
        response_tx: Reply<Vec<OrderRecord>>,
    },
    BookSnapshot {
        market_id: Uuid,
        response_tx: Reply<MarketBookSnapshot>,
    },
    RecentTrades {
        market_id: Uuid,
        limit: usize,
        response_tx: Reply<Vec<Trade>>,
    },
    PositionSummary {
        user_id: Uuid,
        market_id: Uuid,
        response_tx: Reply<Option<PositionSummary>>,
    },
    Leaderboard {
        limit: usize,
        response_tx: Reply<Vec<LeaderboardEntry>>,
    },
    UserHistory {
        user_id: Uuid,
        response_tx: Reply<Vec<MarketHistoryEntry>>,
    },
    MarketMakerStatus {
        market_id: Uuid,
        response_tx: Reply<MarketMakerStatus>,
    },
    SetFairPrice {
        market_id: Uuid,
        yes_price: Decimal,
        response_tx: Reply<ExchangeResult<()>>,
    },
    RefreshQuotes {
        market_id: Uuid,
        response_tx: Reply<ExchangeResult<usize>>,
    },
    Restore {
        store: Arc<dyn OrderStore>,
        response_tx: Reply<ExchangeResult<usize>>,
    },
    /// Shut down the worker thread
    Shutdown,
}

/// Worker thread that owns the exchange state
pub struct ExchangeWorker {
    exchange: Exchange,
    command_rx: Mutex<Option<Receiver<ExchangeCommand>>>,
}

impl ExchangeWorker {
    pub fn new(exchange: Exchange) -> Self {
        Self {
            exchange,
            command_rx: Mutex::new(None),
        }
    }

    /// Starts the worker thread and returns a client to interact with it.
    pub fn start(self) -> (ExchangeClient, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        *self.command_rx.lock() = Some(command_rx);

        let client = ExchangeClient::new(command_tx);
        let mut worker = self;

        let handle = thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!(error = %e, "failed to create runtime for exchange worker");
                    return;
                }
            };
            rt.block_on(worker.run());
        });

        (client, handle)
    }

    /// Main worker loop that processes commands
    async fn run(&mut self) {
        let Some(mut rx) = self.command_rx.lock().take() else {
            error!("exchange worker started without a command receiver");
            return;
        };
        info!(app_id = %self.exchange.config().app_id, "exchange worker started");

        while let Some(cmd) = rx.recv().await {
            match cmd {
                ExchangeCommand::Shutdown => break,
                cmd => self.handle_command(cmd),
            }
        }
        info!("exchange worker stopped");
    }

    fn handle_command(&mut self, cmd: ExchangeCommand) {
        let exchange = &mut self.exchange;
        // a dropped receiver means the caller gave up waiting
        match cmd {
            ExchangeCommand::OpenAccount { user_id, response_tx } => {
                let _ = response_tx.send(exchange.open_account(user_id));
            }
            ExchangeCommand::Deposit {
                user_id,
                amount,
                response_tx,
            } => {
                let _ = response_tx.send(exchange.deposit(user_id, amount));
            }
            ExchangeCommand::Balance { user_id, response_tx } => {
                let _ = response_tx.send(exchange.balance(user_id));
            }
            ExchangeCommand::CreateMarket { question, response_tx } => {
                let _ = response_tx.send(exchange.create_market(question));
            }
            ExchangeCommand::CloseMarket { market_id, response_tx } => {
                let _ = response_tx.send(exchange.close_market(market_id));
            }
            ExchangeCommand::ResolveMarket {
                market_id,
                outcome,
                response_tx,
            } => {
                let _ = response_tx.send(exchange.resolve_market(market_id, outcome));
            }
            ExchangeCommand::DeleteMarket {
                market_id,
                refund,
                response_tx,
            } => {
                let _ = response_tx.send(exchange.delete_market(market_id, refund));
            }
            ExchangeCommand::ListMarkets {
                status,
                limit,
                response_tx,
            } => {
                let _ = response_tx.send(exchange.markets(status, limit));
            }
            ExchangeCommand::SubmitOrder { order, response_tx } => {
                let _ = response_tx.send(exchange.submit_order(order));
            }
            ExchangeCommand::CancelOrder {
                user_id,
                order_id,
                response_tx,
            } => {
                let _ = response_tx.send(exchange.cancel_order(user_id, order_id));
            }
            ExchangeCommand::GetOrder { order_id, response_tx } => {
                let _ = response_tx.send(exchange.order(order_id).cloned());
            }
            ExchangeCommand::OrdersForUser { user_id, response_tx } => {
                let orders = exchange
                    .orders_for_user(user_id)
                    .into_iter()
                    .cloned()
                    .collect();
                let _ = response_tx.send(orders);
            }
            ExchangeCommand::BookSnapshot { market_id, response_tx } => {
                let _ = response_tx.send(exchange.book_snapshot(market_id));
            }
            ExchangeCommand::RecentTrades {
                market_id,
                limit,
                response_tx,
            } => {
                let trades = exchange
                    .recent_trades(market_id, limit)
                    .into_iter()
                    .cloned()
                    .collect();
                let _ = response_tx.send(trades);
            }
            ExchangeCommand::PositionSummary {
                user_id,
                market_id,
                response_tx,
            } => {
                let _ = response_tx.send(exchange.position_summary(user_id, market_id));
            }
            ExchangeCommand::Leaderboard { limit, response_tx } => {
                let _ = response_tx.send(exchange.leaderboard(limit));
            }
            ExchangeCommand::UserHistory { user_id, response_tx } => {
                let _ = response_tx.send(exchange.user_history(user_id));
            }
            ExchangeCommand::MarketMakerStatus { market_id, response_tx } => {
                let _ = response_tx.send(exchange.market_maker_status(market_id));
            }
            ExchangeCommand::SetFairPrice {
                market_id,
                yes_price,
                response_tx,
            } => {
                let _ = response_tx.send(exchange.set_fair_price(market_id, yes_price));
            }
            ExchangeCommand::RefreshQuotes { market_id, response_tx } => {
                let _ = response_tx.send(exchange.refresh_quotes(market_id));
            }
            ExchangeCommand::Restore { store, response_tx } => {
                let _ = response_tx.send(exchange.restore_from_store(store.as_ref()));
            }
            ExchangeCommand::Shutdown => {
                // Handled in the run loop
            }
        }
    }
}

/// Client interface to interact with the ExchangeWorker
#[derive(Clone)]
pub struct ExchangeClient {
    command_tx: Sender<ExchangeCommand>,
}

impl ExchangeClient {
    fn new(command_tx: Sender<ExchangeCommand>) -> Self {
        Self { command_tx }
    }

    /// Sends one command and waits for its reply.
    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> ExchangeCommand,
    ) -> Result<T, WorkerError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(build(response_tx))
            .await
            .map_err(|_| WorkerError::Send)?;
        response_rx.await.map_err(|_| WorkerError::Receive)
    }

    pub async fn open_account(&self, user_id: Uuid) -> Result<Decimal, WorkerError> {
        Ok(self
            .request(|response_tx| ExchangeCommand::OpenAccount { user_id, response_tx })
            .await??)
    }

    pub async fn deposit(&self, user_id: Uuid, amount: Decimal) -> Result<Decimal, WorkerError> {
        Ok(self
            .request(|response_tx| ExchangeCommand::Deposit {
                user_id,
                amount,
                response_tx,
            })
            .await??)
    }

    pub async fn balance(&self, user_id: Uuid) -> Result<Option<Decimal>, WorkerError> {
        self.request(|response_tx| ExchangeCommand::Balance { user_id, response_tx })
            .await
    }

    pub async fn create_market(&self, question: impl Into<String>) -> Result<Market, WorkerError> {
        let question = question.into();
        Ok(self
            .request(|response_tx| ExchangeCommand::CreateMarket { question, response_tx })
            .await??)
    }

    pub async fn close_market(&self, market_id: Uuid) -> Result<usize, WorkerError> {
        Ok(self
            .request(|response_tx| ExchangeCommand::CloseMarket { market_id, response_tx })
            .await??)
    }

    pub async fn resolve_market(
        &self,
        market_id: Uuid,
        outcome: bool,
    ) -> Result<MarketSettlementSummary, WorkerError> {
        Ok(self
            .request(|response_tx| ExchangeCommand::ResolveMarket {
                market_id,
                outcome,
                response_tx,
            })
            .await??)
    }

    /// Closes a market, cancels its orders and drops its books; `refund` returns each position's
    /// cost basis.
    pub async fn delete_market(&self, market_id: Uuid, refund: bool) -> Result<MarketDeletion, WorkerError> {
        Ok(self
            .request(|response_tx| ExchangeCommand::DeleteMarket {
                market_id,
                refund,
                response_tx,
            })
            .await??)
    }

    pub async fn markets(
        &self,
        status: Option<MarketStatus>,
        limit: usize,
    ) -> Result<Vec<MarketListing>, WorkerError> {
        self.request(|response_tx| ExchangeCommand::ListMarkets {
            status,
            limit,
            response_tx,
        })
        .await
    }

    pub async fn submit_order(&self, order: Order) -> Result<OrderOutcome, WorkerError> {
        Ok(self
            .request(|response_tx| ExchangeCommand::SubmitOrder { order, response_tx })
            .await??)
    }

    pub async fn cancel_order(&self, user_id: Uuid, order_id: Uuid) -> Result<OrderRecord, WorkerError> {
        Ok(self
            .request(|response_tx| ExchangeCommand::CancelOrder {
                user_id,
                order_id,
                response_tx,
            })
            .await??)
    }

    pub async fn order(&self, order_id: Uuid) -> Result<Option<OrderRecord>, WorkerError> {
        self.request(|response_tx| ExchangeCommand::GetOrder { order_id, response_tx })
            .await
    }

    pub async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<OrderRecord>, WorkerError> {
        self.request(|response_tx| ExchangeCommand::OrdersForUser { user_id, response_tx })
            .await
    }

    pub async fn book_snapshot(&self, market_id: Uuid) -> Result<MarketBookSnapshot, WorkerError> {
        self.request(|response_tx| ExchangeCommand::BookSnapshot { market_id, response_tx })
            .await
    }

    /// Most recent trades of a market, newest first.
    pub async fn recent_trades(&self, market_id: Uuid, limit: usize) -> Result<Vec<Trade>, WorkerError> {
        self.request(|response_tx| ExchangeCommand::RecentTrades {
            market_id,
            limit,
            response_tx,
        })
        .await
    }

    pub async fn position_summary(
        &self,
        user_id: Uuid,
        market_id: Uuid,
    ) -> Result<Option<PositionSummary>, WorkerError> {
        self.request(|response_tx| ExchangeCommand::PositionSummary {
            user_id,
            market_id,
            response_tx,
        })
        .await
    }

    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, WorkerError> {
        self.request(|response_tx| ExchangeCommand::Leaderboard { limit, response_tx })
            .await
    }

    pub async fn user_history(&self, user_id: Uuid) -> Result<Vec<MarketHistoryEntry>, WorkerError> {
        self.request(|response_tx| ExchangeCommand::UserHistory { user_id, response_tx })
            .await
    }

    pub async fn market_maker_status(&self, market_id: Uuid) -> Result<MarketMakerStatus, WorkerError> {
        self.request(|response_tx| ExchangeCommand::MarketMakerStatus { market_id, response_tx })
            .await
    }

    pub async fn set_fair_price(&self, market_id: Uuid, yes_price: Decimal) -> Result<(), WorkerError> {
        Ok(self
            .request(|response_tx| ExchangeCommand::SetFairPrice {
                market_id,
                yes_price,
                response_tx,
            })
            .await??)
    }

    pub async fn refresh_quotes(&self, market_id: Uuid) -> Result<usize, WorkerError> {
        Ok(self
            .request(|response_tx| ExchangeCommand::RefreshQuotes { market_id, response_tx })
            .await??)
    }

    /// Rebuilds the books from `store`. Send this before any other traffic.
    pub async fn restore(&self, store: Arc<dyn OrderStore>) -> Result<usize, WorkerError> {
        Ok(self
            .request(|response_tx| ExchangeCommand::Restore { store, response_tx })
            .await??)
    }

    /// Shuts down the worker thread.
    pub async fn shutdown(&self) -> Result<(), WorkerError> {
        self.command_tx
            .send(ExchangeCommand::Shutdown)
            .await
            .map_err(|_| WorkerError::Send)
    }
}
