//! Client-side mirror of the server's orders.
//!
//! Every asynchronous fetch is tagged with a [`Ticket`] when it is issued.
//! Tickets grow monotonically across the whole collection, and each order id
//! remembers the ticket of the last mutation applied to it. A fetch result
//! older than that is discarded, which keeps a slow re-fetch from undoing a
//! later delete or optimistic status change.

use std::collections::{HashMap, HashSet};

use crate::domain::{Order, OrderId, OrderRow, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

impl std::fmt::Display for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Marks a status change applied locally before the backing store confirmed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimisticTag {
    pub ticket: Ticket,
    pub previous: OrderStatus,
    pub target: OrderStatus,
}

/// What became of a completed insert fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Prepended to the collection.
    Added,
    /// A poll delivered the order while its fetch was in flight.
    AlreadyPresent,
    /// Abandoned or deleted since the insert was announced.
    Discarded,
}

#[derive(Debug, Default)]
pub struct OrderCollection {
    /// Display order: newest first, except where patched in place.
    orders: Vec<Order>,
    next_ticket: u64,
    last_applied: HashMap<OrderId, Ticket>,
    pending_inserts: HashSet<OrderId>,
    optimistic: HashMap<OrderId, OptimisticTag>,
}

impl OrderCollection {
    /// Seeds the collection from a bulk load, dropping repeated ids.
    pub fn new(orders: Vec<Order>) -> Self {
        let mut collection = Self::default();
        collection.orders = dedup(orders);
        collection
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn get(&self, id: &str) -> Option<&Order> {
        self.orders.iter().find(|order| order.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn issue_ticket(&mut self) -> Ticket {
        self.next_ticket += 1;
        Ticket(self.next_ticket)
    }

    /// Whether a mutation newer than `ticket` has already been applied to `id`.
    pub fn is_stale(&self, id: &str, ticket: Ticket) -> bool {
        self.last_applied.get(id).is_some_and(|last| *last > ticket)
    }

    pub fn optimistic_tag(&self, id: &str) -> Option<&OptimisticTag> {
        self.optimistic.get(id)
    }

    /// Replaces everything with a poll result issued under `ticket`.
    ///
    /// Unconfirmed optimistic changes are dropped along with the old contents.
    pub fn replace_all(&mut self, orders: Vec<Order>, ticket: Ticket) {
        self.orders = dedup(orders);
        self.optimistic.clear();

        let present: HashSet<&str> = self.orders.iter().map(|order| order.id.as_str()).collect();
        self.last_applied.retain(|id, _| present.contains(id.as_str()));
        for order in &self.orders {
            let last = self.last_applied.entry(order.id.clone()).or_insert(ticket);
            *last = (*last).max(ticket);
        }
    }

    /// Registers an insert notification. Returns `None` for an order that is
    /// already present or already being fetched.
    pub fn begin_insert(&mut self, id: &str) -> Option<Ticket> {
        if self.contains(id) || self.pending_inserts.contains(id) {
            return None;
        }
        self.pending_inserts.insert(id.to_string());
        Some(self.issue_ticket())
    }

    /// Prepends a freshly fetched order unless something newer already
    /// placed or removed it.
    pub fn complete_insert(&mut self, order: Order, ticket: Ticket) -> InsertOutcome {
        if !self.pending_inserts.remove(&order.id) {
            return InsertOutcome::Discarded;
        }
        if self.contains(&order.id) {
            return InsertOutcome::AlreadyPresent;
        }
        if self.is_stale(&order.id, ticket) {
            return InsertOutcome::Discarded;
        }
        self.mark_applied(&order.id, ticket);
        self.orders.insert(0, order);
        InsertOutcome::Added
    }

    pub fn abandon_insert(&mut self, id: &str) {
        self.pending_inserts.remove(id);
    }

    /// Replaces a present order with its re-fetched record, keeping its position.
    pub fn apply_refetched(&mut self, order: Order, ticket: Ticket) -> bool {
        if self.is_stale(&order.id, ticket) {
            return false;
        }
        let Some(idx) = self.position(&order.id) else {
            return false;
        };
        self.mark_applied(&order.id, ticket);
        self.orders[idx] = order;
        true
    }

    /// Shallow-merges a pushed row image onto a present order.
    pub fn merge_row(&mut self, row: &OrderRow, ticket: Ticket) -> bool {
        if self.is_stale(&row.id, ticket) {
            return false;
        }
        let Some(idx) = self.position(&row.id) else {
            return false;
        };
        self.mark_applied(&row.id, ticket);
        self.orders[idx].merge_row(row);
        true
    }

    /// Removes the order and leaves a tombstone so older fetches cannot bring it back.
    pub fn remove(&mut self, id: &str) -> Option<Order> {
        let ticket = self.issue_ticket();
        self.mark_applied(id, ticket);
        self.pending_inserts.remove(id);
        self.optimistic.remove(id);
        let idx = self.position(id)?;
        Some(self.orders.remove(idx))
    }

    /// Sets the status in place ahead of confirmation.
    pub fn apply_optimistic(&mut self, id: &str, target: OrderStatus) -> Option<OptimisticTag> {
        let idx = self.position(id)?;
        let ticket = self.issue_ticket();
        let previous = self.orders[idx].status;
        self.orders[idx].status = target;
        self.mark_applied(id, ticket);

        let tag = OptimisticTag {
            ticket,
            previous,
            target,
        };
        self.optimistic.insert(id.to_string(), tag);
        Some(tag)
    }

    pub fn confirm(&mut self, id: &str, ticket: Ticket) -> bool {
        match self.optimistic.get(id) {
            Some(tag) if tag.ticket == ticket => {
                self.optimistic.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Reverts an unconfirmed status change, unless anything newer has been
    /// applied to the order since.
    pub fn rollback(&mut self, id: &str, ticket: Ticket) -> bool {
        let Some(tag) = self.optimistic.get(id).copied() else {
            return false;
        };
        if tag.ticket != ticket || self.last_applied.get(id) != Some(&ticket) {
            return false;
        }
        self.optimistic.remove(id);
        match self.position(id) {
            Some(idx) => {
                self.orders[idx].status = tag.previous;
                true
            }
            None => false,
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.orders.iter().position(|order| order.id == id)
    }

    fn mark_applied(&mut self, id: &str, ticket: Ticket) {
        let last = self.last_applied.entry(id.to_string()).or_insert(ticket);
        *last = (*last).max(ticket);
    }
}

fn dedup(orders: Vec<Order>) -> Vec<Order> {
    let mut seen = HashSet::new();
    orders
        .into_iter()
        .filter(|order| seen.insert(order.id.clone()))
        .collect()
}
