use crate::domain::account::{Amount, UserBalance, UserId, Withdrawal};
use crate::domain::order::{InsertOutcome, Order, OrderStatus, StatusChange};
use crate::domain::order_number::OrderNumber;
use crate::domain::ports::{BalanceLedger, OrderLedger};
use crate::error::{LoyaltyError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for orders, keyed by order number.
pub const CF_ORDERS: &str = "orders";
/// Column Family indexing order numbers by `(user, seq)`.
pub const CF_USER_ORDERS: &str = "user_orders";
/// Column Family for balances, keyed by user.
pub const CF_BALANCES: &str = "balances";
/// Column Family for withdrawals, keyed by `(user, seq)`.
pub const CF_WITHDRAWALS: &str = "withdrawals";
/// Column Family for bookkeeping such as the sequence counter.
pub const CF_META: &str = "meta";

const SEQ_KEY: &[u8] = b"seq";

/// An order with its position in the global upload sequence.
#[derive(Serialize, Deserialize)]
struct StoredOrder {
    seq: u64,
    order: Order,
}

fn seq_key(user: UserId, seq: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&user.to_be_bytes());
    key[8..].copy_from_slice(&seq.to_be_bytes());
    key
}

/// A persistent ledger backed by RocksDB.
///
/// Orders, balances and withdrawals live in separate Column Families. Reads
/// go straight to the database. Writes are serialized by one mutex, and any
/// change touching more than one key is written as a single `WriteBatch`, so
/// a crash or an I/O error never leaves half of it behind.
///
/// `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDbLedger {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbLedger {
    /// Opens or creates a ledger at `path`, creating missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_ORDERS, CF_USER_ORDERS, CF_BALANCES, CF_WITHDRAWALS, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| LoyaltyError::storage(format!("{} column family not found", name)))
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Values of every key in `cf` starting with `prefix`, in key order.
    fn scan_prefix(&self, cf: &str, prefix: &[u8]) -> Result<Vec<Box<[u8]>>> {
        let iter = self
            .db
            .iterator_cf(self.cf(cf)?, IteratorMode::From(prefix, Direction::Forward));
        let mut values = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(value);
        }
        Ok(values)
    }

    fn load_order(&self, number: &OrderNumber) -> Result<Option<StoredOrder>> {
        self.get_json(CF_ORDERS, number.as_str().as_bytes())
    }

    fn load_balance(&self, user: UserId) -> Result<Option<UserBalance>> {
        self.get_json(CF_BALANCES, &user.to_be_bytes())
    }

    /// Next sequence number. Only valid under the write lock; the caller puts
    /// it back into `meta` as part of its batch.
    fn next_seq(&self) -> Result<u64> {
        let current = match self.db.get_cf(self.cf(CF_META)?, SEQ_KEY)? {
            Some(bytes) => {
                let bytes: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| LoyaltyError::storage("Corrupt sequence counter"))?;
                u64::from_be_bytes(bytes)
            }
            None => 0,
        };
        Ok(current + 1)
    }

    fn put_order(&self, batch: &mut WriteBatch, stored: &StoredOrder) -> Result<()> {
        batch.put_cf(
            self.cf(CF_ORDERS)?,
            stored.order.number.as_str().as_bytes(),
            serde_json::to_vec(stored)?,
        );
        Ok(())
    }

    fn put_balance(&self, batch: &mut WriteBatch, balance: &UserBalance) -> Result<()> {
        batch.put_cf(
            self.cf(CF_BALANCES)?,
            balance.user.to_be_bytes(),
            serde_json::to_vec(balance)?,
        );
        Ok(())
    }
}

fn missing_order(number: &OrderNumber) -> LoyaltyError {
    LoyaltyError::NotFound(format!("order {}", number))
}

fn missing_account(user: UserId) -> LoyaltyError {
    LoyaltyError::NotFound(format!("account of user {}", user))
}

#[async_trait]
impl OrderLedger for RocksDbLedger {
    async fn insert_order(&self, order: Order) -> Result<InsertOutcome> {
        let _guard = self.write_lock.lock().await;
        if let Some(existing) = self.load_order(&order.number)? {
            return Ok(InsertOutcome::Exists(existing.order));
        }

        let seq = self.next_seq()?;
        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf(CF_USER_ORDERS)?,
            seq_key(order.user, seq),
            order.number.as_str().as_bytes(),
        );
        batch.put_cf(self.cf(CF_META)?, SEQ_KEY, seq.to_be_bytes());
        self.put_order(&mut batch, &StoredOrder { seq, order })?;
        self.db.write(batch)?;

        Ok(InsertOutcome::Inserted)
    }

    async fn find_order(&self, number: &OrderNumber) -> Result<Option<Order>> {
        Ok(self.load_order(number)?.map(|stored| stored.order))
    }

    async fn orders_for_user(&self, user: UserId) -> Result<Vec<Order>> {
        let mut orders = Vec::new();
        for number in self.scan_prefix(CF_USER_ORDERS, &user.to_be_bytes())? {
            let stored: StoredOrder = self
                .get_json(CF_ORDERS, &number)?
                .ok_or_else(|| LoyaltyError::storage("Order index points to a missing order"))?;
            orders.push(stored.order);
        }
        Ok(orders)
    }

    async fn pending_orders(&self) -> Result<Vec<Order>> {
        let mut pending = Vec::new();
        for item in self.db.iterator_cf(self.cf(CF_ORDERS)?, IteratorMode::Start) {
            let (_key, value) = item?;
            let stored: StoredOrder = serde_json::from_slice(&value)?;
            if !stored.order.status.is_terminal() {
                pending.push(stored);
            }
        }
        pending.sort_by_key(|stored| stored.seq);
        Ok(pending.into_iter().map(|stored| stored.order).collect())
    }

    async fn advance_status(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
    ) -> Result<StatusChange> {
        let _guard = self.write_lock.lock().await;
        let mut stored = self.load_order(number)?.ok_or_else(|| missing_order(number))?;
        if !stored.order.advance(status) {
            return Ok(StatusChange::Unchanged);
        }

        let mut batch = WriteBatch::default();
        self.put_order(&mut batch, &stored)?;
        self.db.write(batch)?;
        Ok(StatusChange::Applied)
    }

    async fn complete_order(&self, number: &OrderNumber, accrual: Amount) -> Result<StatusChange> {
        let _guard = self.write_lock.lock().await;
        let mut stored = self.load_order(number)?.ok_or_else(|| missing_order(number))?;
        if !stored.order.complete(accrual) {
            return Ok(StatusChange::Unchanged);
        }

        let user = stored.order.user;
        let mut balance = self.load_balance(user)?.ok_or_else(|| missing_account(user))?;
        balance.credit(accrual)?;

        let mut batch = WriteBatch::default();
        self.put_order(&mut batch, &stored)?;
        self.put_balance(&mut batch, &balance)?;
        self.db.write(batch)?;
        Ok(StatusChange::Applied)
    }
}

#[async_trait]
impl BalanceLedger for RocksDbLedger {
    async fn open_account(&self, user: UserId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.load_balance(user)?.is_some() {
            return Ok(());
        }
        let mut batch = WriteBatch::default();
        self.put_balance(&mut batch, &UserBalance::new(user))?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn balance(&self, user: UserId) -> Result<Option<UserBalance>> {
        self.load_balance(user)
    }

    async fn credit(&self, user: UserId, amount: Amount) -> Result<UserBalance> {
        let _guard = self.write_lock.lock().await;
        let mut balance = self.load_balance(user)?.ok_or_else(|| missing_account(user))?;
        balance.credit(amount)?;

        let mut batch = WriteBatch::default();
        self.put_balance(&mut batch, &balance)?;
        self.db.write(batch)?;
        Ok(balance)
    }

    async fn withdraw(&self, withdrawal: Withdrawal) -> Result<UserBalance> {
        let _guard = self.write_lock.lock().await;
        let user = withdrawal.user;
        let mut balance = self.load_balance(user)?.ok_or_else(|| missing_account(user))?;
        balance.debit(withdrawal.sum)?;

        let seq = self.next_seq()?;
        let mut batch = WriteBatch::default();
        self.put_balance(&mut batch, &balance)?;
        batch.put_cf(
            self.cf(CF_WITHDRAWALS)?,
            seq_key(user, seq),
            serde_json::to_vec(&withdrawal)?,
        );
        batch.put_cf(self.cf(CF_META)?, SEQ_KEY, seq.to_be_bytes());
        self.db.write(batch)?;
        Ok(balance)
    }

    async fn withdrawals_for_user(&self, user: UserId) -> Result<Vec<Withdrawal>> {
        self.scan_prefix(CF_WITHDRAWALS, &user.to_be_bytes())?
            .iter()
            .map(|value| -> Result<Withdrawal> { Ok(serde_json::from_slice(value)?) })
            .collect()
    }
}
