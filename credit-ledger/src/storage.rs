//! Storage layer using RocksDB
//!
//! The durable store behind the ledger. One column family per table:
//!
//! - `sellers` - Account rows (key: seller_id)
//! - `credit_requests` - Credit request rows (key: request_id)
//! - `transactions` - Append-only log (key: seller_id || seq)
//! - `charge_targets` - Per-destination totals (key: number)
//! - `indices` - Secondary indices for fast lookups
//!
//! Every state-changing ledger operation stages all of its row writes
//! into one [`WriteBatch`] and commits it atomically; a failed
//! operation commits nothing. Two guards run at stage time, as the
//! last-resort counterpart of a relational CHECK constraint:
//!
//! - a seller row with a negative balance is refused;
//! - an existing transaction key is never overwritten (append-only).
//!
//! Both are unreachable given the application-level checks in
//! [`crate::ledger`]; when one fires it is a logic-bug signal and is
//! surfaced as [`Error::ConstraintViolation`].

use crate::{
    error::{Error, Result},
    types::{ChargeTarget, CreditRequest, CreditStatus, PhoneNumber, Seller, TransactionRecord},
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_SELLERS: &str = "sellers";
const CF_REQUESTS: &str = "credit_requests";
const CF_TRANSACTIONS: &str = "transactions";
const CF_TARGETS: &str = "charge_targets";
const CF_INDICES: &str = "indices";

/// Index key prefixes
const IDX_EMAIL: &[u8] = b"email|";
const IDX_SELLER_REQUEST: &[u8] = b"rs|";
const IDX_STATUS_REQUEST: &[u8] = b"st|";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for append-heavy workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_SELLERS, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_REQUESTS, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_TARGETS, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = %path.display(), "Opened RocksDB store");

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_log() -> Options {
        let mut opts = Options::default();
        // The log is write-once, read-on-reconcile; favor compression
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_state() -> Options {
        let mut opts = Options::default();
        // Hot rows, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Seller operations

    /// Get seller by ID
    pub fn get_seller(&self, seller_id: Uuid) -> Result<Seller> {
        let cf = self.cf_handle(CF_SELLERS)?;

        let value = self
            .db
            .get_cf(cf, seller_id.as_bytes())?
            .ok_or(Error::SellerNotFound(seller_id))?;

        let seller: Seller = bincode::deserialize(&value)?;
        Ok(seller)
    }

    /// Look up a seller by email via the uniqueness index
    pub fn seller_id_by_email(&self, email: &str) -> Result<Option<Uuid>> {
        let cf = self.cf_handle(CF_INDICES)?;

        match self.db.get_cf(cf, Self::index_key_email(email))? {
            Some(value) => {
                let bytes: [u8; 16] = value
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("Corrupt email index entry".to_string()))?;
                Ok(Some(Uuid::from_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    /// Create a seller row plus its email uniqueness index entry (atomic)
    ///
    /// The uniqueness check is only sound under the email row lock;
    /// [`crate::Ledger::create_seller`] holds it across check and commit.
    pub fn create_seller(&self, seller: &Seller) -> Result<()> {
        if self.seller_id_by_email(&seller.email)?.is_some() {
            return Err(Error::AlreadyExists(format!(
                "seller with email {}",
                seller.email
            )));
        }

        let mut batch = WriteBatch::default();
        self.stage_seller(&mut batch, seller)?;

        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.put_cf(
            cf_indices,
            Self::index_key_email(&seller.email),
            seller.seller_id.as_bytes(),
        );

        self.commit(batch)?;

        tracing::info!(seller_id = %seller.seller_id, email = %seller.email, "Seller created");
        Ok(())
    }

    // Credit request operations

    /// Get credit request by ID
    pub fn get_request(&self, request_id: Uuid) -> Result<CreditRequest> {
        let cf = self.cf_handle(CF_REQUESTS)?;

        let value = self
            .db
            .get_cf(cf, request_id.as_bytes())?
            .ok_or(Error::RequestNotFound(request_id))?;

        let request: CreditRequest = bincode::deserialize(&value)?;
        Ok(request)
    }

    /// Create a pending request row plus its index entries (atomic)
    pub fn create_request(&self, request: &CreditRequest) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_requests = self.cf_handle(CF_REQUESTS)?;
        batch.put_cf(
            cf_requests,
            request.request_id.as_bytes(),
            bincode::serialize(request)?,
        );

        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.put_cf(
            cf_indices,
            Self::index_key_seller_request(request.seller_id, request.request_id),
            [],
        );
        batch.put_cf(
            cf_indices,
            Self::index_key_status_request(request.status, request.request_id),
            [],
        );

        self.commit(batch)
    }

    /// Get all requests for a seller, oldest first
    pub fn requests_for_seller(&self, seller_id: Uuid) -> Result<Vec<CreditRequest>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let mut prefix = IDX_SELLER_REQUEST.to_vec();
        prefix.extend_from_slice(seller_id.as_bytes());

        let iter = self
            .db
            .iterator_cf(cf_indices, IteratorMode::From(&prefix, Direction::Forward));

        let mut requests = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }

            let request_id_bytes: [u8; 16] = key[prefix.len()..]
                .try_into()
                .map_err(|_| Error::Storage("Corrupt request index entry".to_string()))?;
            requests.push(self.get_request(Uuid::from_bytes(request_id_bytes))?);
        }

        Ok(requests)
    }

    // Transaction log operations

    /// Get a seller's full log in sequence order
    pub fn transactions_for_seller(&self, seller_id: Uuid) -> Result<Vec<TransactionRecord>> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;

        let prefix = seller_id.as_bytes().to_vec();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut records = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }

            let record: TransactionRecord = bincode::deserialize(&value)?;
            records.push(record);
        }

        Ok(records)
    }

    // Charge target operations

    /// Get a charge target, if it has been charged before
    pub fn get_target(&self, number: &PhoneNumber) -> Result<Option<ChargeTarget>> {
        let cf = self.cf_handle(CF_TARGETS)?;

        match self.db.get_cf(cf, number.as_str().as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    // Batch staging (atomic commit units)

    /// Stage a seller row write, enforcing the non-negative balance CHECK
    pub fn stage_seller(&self, batch: &mut WriteBatch, seller: &Seller) -> Result<()> {
        if seller.credit_balance.is_sign_negative() {
            return Err(Error::ConstraintViolation(format!(
                "refusing to commit negative balance {} for seller {}",
                seller.credit_balance, seller.seller_id
            )));
        }

        let cf = self.cf_handle(CF_SELLERS)?;
        batch.put_cf(cf, seller.seller_id.as_bytes(), bincode::serialize(seller)?);
        Ok(())
    }

    /// Stage a request status transition, swapping its status index entry
    pub fn stage_request_transition(
        &self,
        batch: &mut WriteBatch,
        request: &CreditRequest,
        previous_status: CreditStatus,
    ) -> Result<()> {
        let cf_requests = self.cf_handle(CF_REQUESTS)?;
        batch.put_cf(
            cf_requests,
            request.request_id.as_bytes(),
            bincode::serialize(request)?,
        );

        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.delete_cf(
            cf_indices,
            Self::index_key_status_request(previous_status, request.request_id),
        );
        batch.put_cf(
            cf_indices,
            Self::index_key_status_request(request.status, request.request_id),
            [],
        );
        Ok(())
    }

    /// Stage a log append, enforcing the append-only guard
    pub fn stage_transaction(
        &self,
        batch: &mut WriteBatch,
        record: &TransactionRecord,
    ) -> Result<()> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let key = Self::transaction_key(record.seller_id, record.seq);

        // The log is immutable: an occupied key means a seq was reused
        if self.db.get_cf(cf, &key)?.is_some() {
            return Err(Error::ConstraintViolation(format!(
                "transaction seq {} already exists for seller {}",
                record.seq, record.seller_id
            )));
        }

        batch.put_cf(cf, &key, bincode::serialize(record)?);
        Ok(())
    }

    /// Stage a charge target upsert
    pub fn stage_target(&self, batch: &mut WriteBatch, target: &ChargeTarget) -> Result<()> {
        let cf = self.cf_handle(CF_TARGETS)?;
        batch.put_cf(
            cf,
            target.number.as_str().as_bytes(),
            bincode::serialize(target)?,
        );
        Ok(())
    }

    /// Atomically commit a staged batch
    ///
    /// This is the serialization point: either every staged row lands or
    /// none do.
    pub fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.db.write(batch)?;
        Ok(())
    }

    // Key helpers

    fn transaction_key(seller_id: Uuid, seq: u64) -> Vec<u8> {
        let mut key = seller_id.as_bytes().to_vec();
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    fn index_key_email(email: &str) -> Vec<u8> {
        let mut key = IDX_EMAIL.to_vec();
        key.extend_from_slice(email.as_bytes());
        key
    }

    fn index_key_seller_request(seller_id: Uuid, request_id: Uuid) -> Vec<u8> {
        let mut key = IDX_SELLER_REQUEST.to_vec();
        key.extend_from_slice(seller_id.as_bytes());
        key.extend_from_slice(request_id.as_bytes());
        key
    }

    fn index_key_status_request(status: CreditStatus, request_id: Uuid) -> Vec<u8> {
        let mut key = IDX_STATUS_REQUEST.to_vec();
        key.push(status as u8);
        key.extend_from_slice(request_id.as_bytes());
        key
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB store closed");
        Ok(())
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}
