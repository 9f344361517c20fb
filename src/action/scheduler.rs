//! Cooperative run-list of in-flight actions
//!
//! Actions live in slots owned by their host controller. To run a step the
//! host takes the action out of its slot, hands it `&mut self`, and settles
//! the returned [`Step`] afterwards:
//!
//! ```text
//!   reserve/take ──► action.step(host) ──► settle(step)
//!                          │                   │
//!            may add/remove other actions      ├─ Continue : put back
//!            (or remove itself)                ├─ WaitFor  : put back, arm timer
//!                                              └─ Finished : drop slot + timers
//! ```
//!
//! A slot removed while its action was running is gone when the step
//! settles, and the action is dropped. Every armed timer carries the slot's
//! generation; re-arming bumps it, so stale expirations are ignored.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use super::{Classified, FeatureAction, Step};
use crate::protocol::CecMessage;
use crate::stats::ServiceStats;

/// Identifier of an action instance within one scheduler
pub type ActionId = u64;

struct Slot<A: Classified> {
    id: ActionId,
    kind: A::Kind,
    /// `None` while the action is running
    action: Option<A>,
    generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    deadline: Instant,
    id: ActionId,
    state: u32,
    generation: u64,
}

/// Run-list of one local device
pub struct ActionScheduler<A: Classified> {
    slots: Vec<Slot<A>>,
    timers: Vec<Timer>,
    next_id: ActionId,
    running: Option<ActionId>,
    stats: Option<Arc<ServiceStats>>,
}

impl<A: Classified> Default for ActionScheduler<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Classified> ActionScheduler<A> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            timers: Vec::new(),
            next_id: 1,
            running: None,
            stats: None,
        }
    }

    pub fn with_stats(stats: Arc<ServiceStats>) -> Self {
        Self {
            stats: Some(stats),
            ..Self::new()
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether an action of `kind` is in the run-list (running or not)
    pub fn has(&self, kind: A::Kind) -> bool {
        self.slots.iter().any(|slot| slot.kind == kind)
    }

    pub fn count(&self, kind: A::Kind) -> usize {
        self.slots.iter().filter(|slot| slot.kind == kind).count()
    }

    /// Kinds in run-list order
    pub fn kinds(&self) -> Vec<A::Kind> {
        self.slots.iter().map(|slot| slot.kind).collect()
    }

    /// Idle actions of `kind`. The running action is not visible.
    pub fn iter_kind(&self, kind: A::Kind) -> impl Iterator<Item = &A> {
        self.slots
            .iter()
            .filter(move |slot| slot.kind == kind)
            .filter_map(|slot| slot.action.as_ref())
    }

    /// Id of the action whose step is executing
    pub fn running(&self) -> Option<ActionId> {
        self.running
    }

    /// Remove every action of `kind` except `keep`. Returns how many went.
    pub fn remove_kind_except(&mut self, kind: A::Kind, keep: Option<ActionId>) -> usize {
        let doomed: Vec<ActionId> = self
            .slots
            .iter()
            .filter(|slot| slot.kind == kind && Some(slot.id) != keep)
            .map(|slot| slot.id)
            .collect();
        if doomed.is_empty() {
            return 0;
        }
        self.slots.retain(|slot| !doomed.contains(&slot.id));
        self.timers.retain(|timer| !doomed.contains(&timer.id));
        debug!(?kind, removed = doomed.len(), "Removed actions");
        doomed.len()
    }

    /// Remove idle actions of `kind` matching `pred`
    pub fn remove_matching<F>(&mut self, kind: A::Kind, pred: F) -> usize
    where
        F: Fn(&A) -> bool,
    {
        let doomed: Vec<ActionId> = self
            .slots
            .iter()
            .filter(|slot| slot.kind == kind)
            .filter(|slot| slot.action.as_ref().is_some_and(&pred))
            .map(|slot| slot.id)
            .collect();
        self.slots.retain(|slot| !doomed.contains(&slot.id));
        self.timers.retain(|timer| !doomed.contains(&timer.id));
        doomed.len()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.slots.clear();
        self.timers.clear();
    }

    /// Earliest armed timer
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().map(|timer| timer.deadline).min()
    }

    fn ids(&self) -> Vec<ActionId> {
        self.slots.iter().map(|slot| slot.id).collect()
    }

    fn first_of(&self, kind: A::Kind) -> Option<ActionId> {
        self.slots
            .iter()
            .find(|slot| slot.kind == kind && slot.action.is_some())
            .map(|slot| slot.id)
    }

    fn reserve(&mut self, kind: A::Kind) -> ActionId {
        let id = self.next_id;
        self.next_id += 1;
        self.slots.push(Slot {
            id,
            kind,
            action: None,
            generation: 0,
        });
        if let Some(stats) = &self.stats {
            stats.action_started();
        }
        debug!(?kind, id, "Starting action");
        id
    }

    fn take(&mut self, id: ActionId) -> Option<A> {
        self.slots
            .iter_mut()
            .find(|slot| slot.id == id)
            .and_then(|slot| slot.action.take())
    }

    /// Take an action for a timer expiration, unless the timer is stale
    fn take_for_timer(&mut self, timer: &Timer) -> Option<A> {
        let slot = self.slots.iter_mut().find(|slot| slot.id == timer.id)?;
        if slot.generation != timer.generation {
            trace!(id = timer.id, "Ignoring stale timer");
            return None;
        }
        slot.action.take()
    }

    fn enter(&mut self, id: ActionId) -> Option<ActionId> {
        self.running.replace(id)
    }

    fn settle(&mut self, id: ActionId, action: A, step: Step, prev: Option<ActionId>) {
        self.running = prev;

        let Some(index) = self.slots.iter().position(|slot| slot.id == id) else {
            // Removed while running
            return;
        };

        match step {
            Step::Finished => {
                let slot = self.slots.remove(index);
                self.timers.retain(|timer| timer.id != id);
                debug!(kind = ?slot.kind, id, "Action finished");
            }
            Step::Continue => {
                self.slots[index].action = Some(action);
            }
            Step::WaitFor { state, timeout } => {
                let slot = &mut self.slots[index];
                slot.generation += 1;
                slot.action = Some(action);
                let generation = slot.generation;
                self.timers.retain(|timer| timer.id != id);
                self.timers.push(Timer {
                    deadline: Instant::now() + timeout,
                    id,
                    state,
                    generation,
                });
            }
        }
    }

    fn take_due_timers(&mut self, now: Instant) -> Vec<Timer> {
        let mut due: Vec<Timer> = Vec::new();
        self.timers.retain(|timer| {
            if timer.deadline <= now {
                due.push(*timer);
                false
            } else {
                true
            }
        });
        due.sort_by_key(|timer| timer.deadline);
        due
    }

    fn timer_fired(&self) {
        if let Some(stats) = &self.stats {
            stats.action_timeout();
        }
    }
}

/// A controller owning an [`ActionScheduler`]
///
/// The provided methods are the run-list operations controllers and actions
/// use: start, remove and look up by kind, forward messages, fire timers.
pub trait ActionHost: Sized {
    type Action: Classified + FeatureAction<Self>;

    fn scheduler(&mut self) -> &mut ActionScheduler<Self::Action>;

    fn scheduler_ref(&self) -> &ActionScheduler<Self::Action>;

    /// Append an action and run its start step synchronously
    fn add_and_start_action(&mut self, action: Self::Action) -> ActionId {
        let mut action = action;
        let id = self.scheduler().reserve(action.kind());
        let prev = self.scheduler().enter(id);
        let step = action.start(self);
        self.scheduler().settle(id, action, step, prev);
        id
    }

    fn has_action(&self, kind: <Self::Action as Classified>::Kind) -> bool {
        self.scheduler_ref().has(kind)
    }

    /// Cancel every action of `kind`
    fn remove_action(&mut self, kind: <Self::Action as Classified>::Kind) {
        self.scheduler().remove_kind_except(kind, None);
    }

    /// Cancel every action of `kind` except the one currently running
    fn remove_other_actions(&mut self, kind: <Self::Action as Classified>::Kind) {
        let keep = self.scheduler_ref().running();
        self.scheduler().remove_kind_except(kind, keep);
    }

    /// Offer a message to each action in order. Returns true once one
    /// consumes it.
    fn dispatch_to_actions(&mut self, message: &CecMessage) -> bool {
        for id in self.scheduler_ref().ids() {
            let Some(mut action) = self.scheduler().take(id) else {
                continue;
            };
            let prev = self.scheduler().enter(id);
            match action.process_command(self, message) {
                Some(step) => {
                    self.scheduler().settle(id, action, step, prev);
                    return true;
                }
                None => self.scheduler().settle(id, action, Step::Continue, prev),
            }
        }
        false
    }

    /// Run the timer steps of every timer due at `now`. Returns how many ran.
    fn fire_timers(&mut self, now: Instant) -> usize {
        let due = self.scheduler().take_due_timers(now);
        let mut fired = 0;
        for timer in due {
            let Some(mut action) = self.scheduler().take_for_timer(&timer) else {
                continue;
            };
            self.scheduler_ref().timer_fired();
            let prev = self.scheduler().enter(timer.id);
            let step = action.handle_timer_event(self, timer.state);
            self.scheduler().settle(timer.id, action, step, prev);
            fired += 1;
        }
        fired
    }

    /// Run an out-of-band step on the first idle action of `kind`
    fn drive_action<F>(&mut self, kind: <Self::Action as Classified>::Kind, f: F) -> bool
    where
        F: FnOnce(&mut Self::Action, &mut Self) -> Step,
    {
        let Some(id) = self.scheduler_ref().first_of(kind) else {
            return false;
        };
        let Some(mut action) = self.scheduler().take(id) else {
            return false;
        };
        let prev = self.scheduler().enter(id);
        let step = f(&mut action, self);
        self.scheduler().settle(id, action, step, prev);
        true
    }
}

/// Timeout helper for actions
pub(crate) fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::LogicalAddress;

    const PING: u8 = 0x9F;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Kind {
        Waiter,
        Instant,
        Spawner,
    }

    enum TestAction {
        /// Waits for a message or a timeout, optionally re-arming once
        Waiter { rearm: bool },
        /// Finishes on start
        Instant,
        /// Starts a waiter and removes every other spawner
        Spawner,
    }

    impl Classified for TestAction {
        type Kind = Kind;
        fn kind(&self) -> Kind {
            match self {
                TestAction::Waiter { .. } => Kind::Waiter,
                TestAction::Instant => Kind::Instant,
                TestAction::Spawner => Kind::Spawner,
            }
        }
    }

    #[derive(Default)]
    struct Host {
        actions: ActionScheduler<TestAction>,
        log: Vec<&'static str>,
    }

    impl ActionHost for Host {
        type Action = TestAction;
        fn scheduler(&mut self) -> &mut ActionScheduler<TestAction> {
            &mut self.actions
        }
        fn scheduler_ref(&self) -> &ActionScheduler<TestAction> {
            &self.actions
        }
    }

    impl FeatureAction<Host> for TestAction {
        fn start(&mut self, host: &mut Host) -> Step {
            match self {
                TestAction::Waiter { .. } => Step::wait(1, millis(100)),
                TestAction::Instant => {
                    host.log.push("instant");
                    Step::Finished
                }
                TestAction::Spawner => {
                    host.remove_other_actions(Kind::Spawner);
                    host.add_and_start_action(TestAction::Waiter { rearm: false });
                    Step::Continue
                }
            }
        }

        fn process_command(&mut self, host: &mut Host, message: &CecMessage) -> Option<Step> {
            match self {
                TestAction::Waiter { .. } if message.opcode == PING => {
                    host.log.push("consumed");
                    Some(Step::Finished)
                }
                _ => None,
            }
        }

        fn handle_timer_event(&mut self, host: &mut Host, state: u32) -> Step {
            host.log.push("timeout");
            match self {
                TestAction::Waiter { rearm } if *rearm => {
                    *rearm = false;
                    Step::wait(state + 1, millis(100))
                }
                _ => Step::Finished,
            }
        }
    }

    fn ping() -> CecMessage {
        CecMessage::command(
            LogicalAddress::Playback1,
            LogicalAddress::Tv,
            PING,
        )
    }

    fn later(ms: u64) -> Instant {
        Instant::now() + Duration::from_millis(ms)
    }

    #[test]
    fn test_finished_on_start_is_removed() {
        let mut host = Host::default();
        host.add_and_start_action(TestAction::Instant);

        assert_eq!(host.log, vec!["instant"]);
        assert!(host.actions.is_empty());
    }

    #[test]
    fn test_message_consumed_by_waiting_action() {
        let mut host = Host::default();
        host.add_and_start_action(TestAction::Waiter { rearm: false });
        assert!(host.has_action(Kind::Waiter));
        assert!(host.actions.next_deadline().is_some());

        assert!(host.dispatch_to_actions(&ping()));
        assert!(!host.has_action(Kind::Waiter));
        assert!(host.actions.next_deadline().is_none());

        // Nobody left to consume it
        assert!(!host.dispatch_to_actions(&ping()));
    }

    #[test]
    fn test_timer_fires_and_rearms() {
        let mut host = Host::default();
        host.add_and_start_action(TestAction::Waiter { rearm: true });

        assert_eq!(host.fire_timers(Instant::now()), 0);
        assert_eq!(host.fire_timers(later(1_000)), 1);
        assert!(host.has_action(Kind::Waiter));

        assert_eq!(host.fire_timers(later(1_000)), 1);
        assert!(!host.has_action(Kind::Waiter));
        assert_eq!(host.log, vec!["timeout", "timeout"]);
    }

    #[test]
    fn test_stale_timer_ignored_after_remove() {
        let mut host = Host::default();
        host.add_and_start_action(TestAction::Waiter { rearm: false });
        host.remove_action(Kind::Waiter);

        assert_eq!(host.fire_timers(later(1_000)), 0);
        assert!(host.log.is_empty());
    }

    #[test]
    fn test_nested_start_and_self_preserving_removal() {
        let mut host = Host::default();
        host.add_and_start_action(TestAction::Spawner);
        host.add_and_start_action(TestAction::Spawner);

        // Second spawner removed the first but kept itself
        assert_eq!(host.actions.count(Kind::Spawner), 1);
        assert_eq!(host.actions.count(Kind::Waiter), 2);
        assert_eq!(
            host.actions.kinds(),
            vec![Kind::Waiter, Kind::Spawner, Kind::Waiter]
        );
        assert!(host.actions.running().is_none());
    }

    #[test]
    fn test_drive_action() {
        let mut host = Host::default();
        assert!(!host.drive_action(Kind::Waiter, |_, _| Step::Finished));

        host.add_and_start_action(TestAction::Waiter { rearm: false });
        assert!(host.drive_action(Kind::Waiter, |_, host| {
            host.log.push("driven");
            Step::Finished
        }));
        assert!(host.actions.is_empty());
        assert_eq!(host.log, vec!["driven"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_follows_runtime_clock() {
        let mut host = Host::default();
        host.add_and_start_action(TestAction::Waiter { rearm: false });

        let deadline = host.actions.next_deadline().unwrap();
        assert_eq!(deadline - Instant::now(), millis(100));

        tokio::time::sleep_until(deadline).await;
        assert_eq!(host.fire_timers(Instant::now()), 1);
        assert_eq!(host.log, vec!["timeout"]);
        assert!(host.actions.next_deadline().is_none());
    }
}
