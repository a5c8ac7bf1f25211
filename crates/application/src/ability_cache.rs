use std::collections::HashMap;
use std::sync::Arc;

use permisos_core::{AppError, AppResult, TenantId, UserIdentity};
use permisos_domain::{AbilityPredicate, Role};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::PermissionStore;
use crate::permission_store::{SubjectKey, subject_key};

/// Lifecycle of the compiled ability of one subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AbilityPhase {
    /// Nothing was compiled yet.
    #[default]
    Unloaded,
    /// A load and compilation is in flight.
    Loading,
    /// A current predicate is available.
    Ready,
    /// The role changed; the old predicate must not be served.
    Stale,
}

#[derive(Default)]
struct SlotState {
    phase: AbilityPhase,
    predicate: Option<Arc<AbilityPredicate>>,
    generation: u64,
}

struct Compiled {
    role: Option<Role>,
    predicate: Arc<AbilityPredicate>,
}

#[derive(Default)]
struct SubjectSlot {
    compile_lock: Mutex<()>,
    state: RwLock<SlotState>,
}

impl SubjectSlot {
    async fn ready_predicate(&self) -> Option<Arc<AbilityPredicate>> {
        let state = self.state.read().await;
        match state.phase {
            AbilityPhase::Ready => state.predicate.clone(),
            _ => None,
        }
    }

    async fn begin_loading(&self) -> (u64, AbilityPhase) {
        let mut state = self.state.write().await;
        let previous = state.phase;
        state.phase = AbilityPhase::Loading;
        (state.generation, previous)
    }

    /// Ends a failed load.
    ///
    /// Only a `Transport` failure leaves a held predicate in effect; any
    /// other failure drops it and marks the subject stale.
    async fn abort(&self, generation: u64, previous: AbilityPhase, error: &AppError) {
        let mut state = self.state.write().await;
        if state.generation != generation {
            return;
        }

        if state.predicate.is_none() || matches!(error, AppError::Transport(_)) {
            state.phase = previous;
        } else {
            state.predicate = None;
            state.phase = AbilityPhase::Stale;
        }
    }

    async fn invalidate(&self) {
        let mut state = self.state.write().await;
        state.generation = state.generation.wrapping_add(1);
        state.predicate = None;
        if state.phase != AbilityPhase::Unloaded {
            state.phase = AbilityPhase::Stale;
        }
    }
}

/// Per-subject memo of compiled ability predicates.
///
/// At most one predicate is live per subject and at most one compilation
/// per subject runs at a time. Stale predicates are never served: callers
/// arriving while a subject is `Stale` or `Loading` wait for the next
/// compilation.
#[derive(Clone)]
pub struct AbilityCache {
    store: PermissionStore,
    slots: Arc<RwLock<HashMap<SubjectKey, Arc<SubjectSlot>>>>,
}

impl AbilityCache {
    /// Creates an empty cache backed by a permission store.
    #[must_use]
    pub fn new(store: PermissionStore) -> Self {
        Self {
            store,
            slots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the current predicate, loading and compiling it on a miss.
    ///
    /// A subject without a role compiles to the empty predicate.
    pub async fn get_or_compile(
        &self,
        identity: &UserIdentity,
    ) -> AppResult<Arc<AbilityPredicate>> {
        let slot = self.slot(identity).await;
        if let Some(predicate) = slot.ready_predicate().await {
            return Ok(predicate);
        }

        let _compiling = slot.compile_lock.lock().await;
        loop {
            if let Some(predicate) = slot.ready_predicate().await {
                return Ok(predicate);
            }

            let (generation, previous) = slot.begin_loading().await;
            match self.load_and_compile(identity).await {
                Ok(compiled) => {
                    if let Some(predicate) =
                        self.publish(&slot, identity, generation, compiled).await
                    {
                        return Ok(predicate);
                    }
                    debug!(
                        tenant_id = %identity.tenant_id(),
                        subject = %identity.subject(),
                        "ability invalidated during compilation, recompiling"
                    );
                }
                Err(error) => {
                    slot.abort(generation, previous, &error).await;
                    return Err(error);
                }
            }
        }
    }

    /// Reloads the role of a subject and recompiles its predicate.
    ///
    /// When the backend is unreachable a previously `Ready` predicate stays
    /// in effect. Malformed role data drops it, so queries fail closed.
    pub async fn refresh(&self, identity: &UserIdentity) -> AppResult<Arc<AbilityPredicate>> {
        let slot = self.slot(identity).await;
        let _compiling = slot.compile_lock.lock().await;

        loop {
            let (generation, previous) = slot.begin_loading().await;
            match self.load_and_compile(identity).await {
                Ok(compiled) => {
                    if let Some(predicate) =
                        self.publish(&slot, identity, generation, compiled).await
                    {
                        info!(
                            tenant_id = %identity.tenant_id(),
                            subject = %identity.subject(),
                            rule_count = predicate.rules().len(),
                            "ability refreshed"
                        );
                        return Ok(predicate);
                    }
                }
                Err(error) => {
                    slot.abort(generation, previous, &error).await;
                    if !matches!(error, AppError::Transport(_)) {
                        self.store.forget(identity).await;
                    }
                    warn!(
                        tenant_id = %identity.tenant_id(),
                        subject = %identity.subject(),
                        error = %error,
                        "ability refresh failed"
                    );
                    return Err(error);
                }
            }
        }
    }

    /// Marks the predicate of a subject stale.
    ///
    /// Once this returns, no later `get_or_compile` call observes a
    /// predicate compiled before the invalidation.
    pub async fn invalidate(&self, identity: &UserIdentity) {
        let slot = self.slots.read().await.get(&subject_key(identity)).cloned();
        if let Some(slot) = slot {
            slot.invalidate().await;
        }
        self.store.forget(identity).await;

        debug!(
            tenant_id = %identity.tenant_id(),
            subject = %identity.subject(),
            "ability invalidated"
        );
    }

    /// Marks every cached predicate of a tenant stale.
    pub async fn invalidate_tenant(&self, tenant_id: TenantId) {
        let slots: Vec<(SubjectKey, Arc<SubjectSlot>)> = self
            .slots
            .read()
            .await
            .iter()
            .filter(|((slot_tenant, _), _)| *slot_tenant == tenant_id)
            .map(|(key, slot)| (key.clone(), slot.clone()))
            .collect();

        for ((slot_tenant, subject), slot) in slots {
            slot.invalidate().await;
            self.store
                .forget(&UserIdentity::new(subject, slot_tenant))
                .await;
        }

        debug!(tenant_id = %tenant_id, "tenant abilities invalidated");
    }

    /// Drops all cached state of a subject, e.g. on sign-out.
    pub async fn evict(&self, identity: &UserIdentity) {
        self.invalidate(identity).await;
        self.slots.write().await.remove(&subject_key(identity));
    }

    /// Returns the lifecycle phase of a subject.
    pub async fn phase(&self, identity: &UserIdentity) -> AbilityPhase {
        let slot = self.slots.read().await.get(&subject_key(identity)).cloned();
        match slot {
            Some(slot) => slot.state.read().await.phase,
            None => AbilityPhase::Unloaded,
        }
    }

    async fn slot(&self, identity: &UserIdentity) -> Arc<SubjectSlot> {
        let key = subject_key(identity);
        if let Some(slot) = self.slots.read().await.get(&key) {
            return slot.clone();
        }

        self.slots.write().await.entry(key).or_default().clone()
    }

    /// Publishes a compiled predicate unless an invalidation happened since
    /// `generation`.
    async fn publish(
        &self,
        slot: &SubjectSlot,
        identity: &UserIdentity,
        generation: u64,
        compiled: Compiled,
    ) -> Option<Arc<AbilityPredicate>> {
        let mut state = slot.state.write().await;
        if state.generation != generation {
            return None;
        }

        // Stored under the slot lock so a racing invalidate always forgets it.
        self.store.remember(identity, compiled.role).await;
        state.phase = AbilityPhase::Ready;
        state.predicate = Some(compiled.predicate.clone());
        Some(compiled.predicate)
    }

    async fn load_and_compile(&self, identity: &UserIdentity) -> AppResult<Compiled> {
        match self.store.fetch(identity).await {
            Ok(role) => Ok(Compiled {
                predicate: Arc::new(AbilityPredicate::compile(&role)),
                role: Some(role),
            }),
            Err(error) if error.is_not_found() => Ok(Compiled {
                role: None,
                predicate: Arc::new(AbilityPredicate::empty()),
            }),
            Err(error) => Err(error),
        }
    }
}
