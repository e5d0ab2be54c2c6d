//! In-process warehouse.
//!
//! Clones share the same tables, so a test can keep one handle, pass another
//! to the pipeline as the connector, and inspect the written tables after the
//! run.

use super::{Connector, TableName, Warehouse};
use crate::config::ConnectionSettings;
use crate::error::{CleanupError, Result};
use polars::prelude::DataFrame;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<TableName, DataFrame>,
    failing_writes: HashSet<TableName>,
    connects: usize,
    reads: usize,
    closed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_table(self, name: TableName, df: DataFrame) -> Self {
        self.insert_table(name, df);
        self
    }

    pub fn insert_table(&self, name: TableName, df: DataFrame) {
        self.state.borrow_mut().tables.insert(name, df);
    }

    pub fn table(&self, name: &TableName) -> Option<DataFrame> {
        self.state.borrow().tables.get(name).cloned()
    }

    /// Make every later write to `name` fail with a warehouse error.
    pub fn fail_writes_to(&self, name: TableName) {
        self.state.borrow_mut().failing_writes.insert(name);
    }

    pub fn connect_count(&self) -> usize {
        self.state.borrow().connects
    }

    pub fn read_count(&self) -> usize {
        self.state.borrow().reads
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }
}

impl Warehouse for MemoryWarehouse {
    async fn read_table(&self, table: &TableName) -> Result<DataFrame> {
        let mut state = self.state.borrow_mut();
        state.reads += 1;
        state.tables.get(table).cloned().ok_or_else(|| {
            CleanupError::Warehouse(format!("[TABLE_OR_VIEW_NOT_FOUND] {table} does not exist"))
        })
    }

    async fn overwrite_table(&self, table: &TableName, df: &DataFrame) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.failing_writes.contains(table) {
            return Err(CleanupError::Warehouse(format!("write to {table} rejected")));
        }
        if df.width() == 0 {
            return Err(CleanupError::DataProcessing(format!(
                "cannot write {table}: frame has no columns"
            )));
        }
        state.tables.insert(table.clone(), df.clone());
        Ok(())
    }

    async fn close(self) -> Result<()> {
        self.state.borrow_mut().closed = true;
        Ok(())
    }
}

impl Connector for MemoryWarehouse {
    type Session = Self;

    /// Checks the settings the way a real connection would, then hands out a
    /// handle on the shared tables.
    async fn connect(&self, settings: &ConnectionSettings) -> Result<Self> {
        settings.warehouse_id()?;
        let mut state = self.state.borrow_mut();
        state.connects += 1;
        state.closed = false;
        Ok(self.clone())
    }
}
