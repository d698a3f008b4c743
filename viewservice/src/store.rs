use std::collections::HashMap;

use log::{info, trace, warn};

use crate::{
    error::{Error, Result},
    View,
};

/// The current view and the bookkeeping that moves it forward.
///
/// Liveness is measured in ticks of the failure detector, never in wall-clock
/// time. A role change is only made once the current primary has pinged with
/// the current view number, except when the primary itself restarts.
#[derive(Debug)]
pub struct ViewStore {
    view: View,
    dead_pings: u64,
    tick: u64,
    /// Tick of the latest ping of each server seen.
    last_seen: HashMap<String, u64>,
    /// Latest view number reported by each server while primary.
    acked: HashMap<String, u64>,
}

impl ViewStore {
    /// An empty store declaring servers dead after `dead_pings` silent ticks.
    pub fn new(dead_pings: u64) -> Self {
        Self {
            view: View::default(),
            dead_pings,
            tick: 0,
            last_seen: HashMap::new(),
            acked: HashMap::new(),
        }
    }

    /// Snapshot of the current view.
    pub fn view(&self) -> View {
        self.view.clone()
    }

    /// Number of ticks run so far.
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Whether `me` is the current primary.
    pub fn is_primary(&self, me: &str) -> bool {
        self.view.is_primary(me)
    }

    /// Whether `me` is the current backup.
    pub fn is_backup(&self, me: &str) -> bool {
        self.view.is_backup(me)
    }

    /// Whether the view has a primary.
    pub fn has_primary(&self) -> bool {
        self.view.primary.is_some()
    }

    /// Whether the view has a backup.
    pub fn has_backup(&self) -> bool {
        self.view.backup.is_some()
    }

    /// Whether the primary has pinged with the current view number.
    pub fn primary_acked(&self) -> bool {
        self.view
            .primary
            .as_ref()
            .and_then(|p| self.acked.get(p))
            .map_or(false, |&n| n == self.view.viewnum)
    }

    /// Handles a ping from `me`, which has last seen view `viewnum`, and
    /// returns the resulting view.
    ///
    /// Fails only when the primary restarts without a backup to take over.
    pub fn record_ping(&mut self, me: &str, viewnum: u64) -> Result<View> {
        trace!("ping from {} at view {}, current {}", me, viewnum, self.view);

        if !self.has_primary() && self.view.viewnum == 0 {
            self.view.primary = Some(me.to_owned());
            self.advance();
            self.seen(me);
        } else if self.is_primary(me) {
            if viewnum == 0 {
                warn!("primary {} restarted", me);
                self.promote_backup()?;
            } else {
                if viewnum != self.view.viewnum {
                    trace!("primary {} acked view {} in view {}", me, viewnum, self.view.viewnum);
                }
                self.acked.insert(me.to_owned(), viewnum);
                self.seen(me);
            }
        } else if self.has_primary() && !self.has_backup() && self.primary_acked() {
            self.view.backup = Some(me.to_owned());
            self.advance();
            self.seen(me);
        } else if self.is_backup(me) {
            // A backup reporting view 0 lost its state and needs a new view
            // for the primary to transfer it again.
            if viewnum == 0 && self.primary_acked() {
                info!("backup {} restarted", me);
                self.advance();
            }
            self.seen(me);
        } else {
            self.seen(me);
        }

        Ok(self.view())
    }

    /// Runs one period of the failure detector.
    ///
    /// Fails only when the primary is found dead without a backup to take
    /// over.
    pub fn tick(&mut self) -> Result<()> {
        self.tick += 1;

        // Backup first: promotion rewrites the roles this check reads.
        if let Some(backup) = self.view.backup.clone() {
            if self.is_dead(&backup) && self.primary_acked() {
                warn!("backup {} is dead", backup);
                self.view.backup = None;
                self.forget(&backup);
                self.advance();
            }
        }

        if let Some(primary) = self.view.primary.clone() {
            if self.is_dead(&primary) && self.primary_acked() {
                warn!("primary {} is dead", primary);
                self.promote_backup()?;
            }
        }

        Ok(())
    }

    /// Makes the backup the primary, leaving the backup slot empty.
    ///
    /// The new primary keeps its own liveness and acknowledgment records, so
    /// it has not acknowledged the resulting view yet.
    pub fn promote_backup(&mut self) -> Result<()> {
        let backup = self.view.backup.take().ok_or_else(|| Error::NoBackup {
            viewnum: self.view.viewnum,
            primary: self.view.primary.clone(),
        })?;
        if let Some(old) = self.view.primary.replace(backup) {
            self.forget(&old);
        }
        self.advance();
        Ok(())
    }

    fn advance(&mut self) {
        debug_assert!(self.view.primary.is_none() || self.view.primary != self.view.backup);
        self.view.viewnum += 1;
        info!("view {}", self.view);
    }

    fn seen(&mut self, me: &str) {
        self.last_seen.insert(me.to_owned(), self.tick);
    }

    fn forget(&mut self, me: &str) {
        self.last_seen.remove(me);
        self.acked.remove(me);
    }

    fn is_dead(&self, me: &str) -> bool {
        let last = self.last_seen.get(me).copied().unwrap_or(0);
        self.tick.saturating_sub(last) >= self.dead_pings
    }
}
