use crate::aop::{AspectDescriptor, InterceptionSurface, WeaverPtr};
use crate::error::ProxyGenerationError;
use crate::instance::TypeKey;
use fxhash::FxHashMap;
use itertools::Itertools;
use parking_lot::RwLock;
use std::any::TypeId;
use std::sync::Arc;
use tracing::debug;

/// Precomputed interceptors of every method of an interception surface, for a single target type.
#[derive(Clone)]
pub struct InterceptedCallPlan {
    target: TypeKey,
    surface: &'static InterceptionSurface,
    interceptors: Vec<Vec<WeaverPtr>>,
    weavers: Vec<WeaverPtr>,
}

impl InterceptedCallPlan {
    /// Matches all aspects against all surface methods. Returns `None` if nothing matches.
    pub fn build(
        target: TypeKey,
        surface: &'static InterceptionSurface,
        aspects: &[AspectDescriptor],
    ) -> Option<Self> {
        let interceptors = surface
            .methods
            .iter()
            .map(|method| {
                aspects
                    .iter()
                    .filter(|aspect| aspect.matcher.matches(&target, method))
                    .map(|aspect| aspect.weaver.clone())
                    .unique_by(weaver_identity)
                    .collect_vec()
            })
            .collect_vec();

        if interceptors.iter().all(|weavers| weavers.is_empty()) {
            return None;
        }

        let weavers = interceptors
            .iter()
            .flatten()
            .unique_by(|weaver| weaver_identity(weaver))
            .cloned()
            .collect_vec();

        Some(Self {
            target,
            surface,
            interceptors,
            weavers,
        })
    }

    #[inline]
    pub fn target(&self) -> TypeKey {
        self.target
    }

    #[inline]
    pub fn surface(&self) -> &'static InterceptionSurface {
        self.surface
    }

    /// Ordered interceptors of the method with given index.
    #[inline]
    pub fn interceptors(&self, method_index: usize) -> &[WeaverPtr] {
        self.interceptors
            .get(method_index)
            .map(|weavers| weavers.as_slice())
            .unwrap_or_default()
    }

    #[inline]
    pub fn intercepts(&self, method_index: usize) -> bool {
        !self.interceptors(method_index).is_empty()
    }

    /// All distinct weavers taking part in the plan.
    #[inline]
    pub fn weavers(&self) -> &[WeaverPtr] {
        &self.weavers
    }
}

fn weaver_identity(weaver: &WeaverPtr) -> *const () {
    Arc::as_ptr(weaver) as *const ()
}

type PlanCacheKey = (TypeId, TypeId);

/// Creates and caches [InterceptedCallPlan]s.
#[derive(Default)]
pub struct ProxyFactory {
    aspects: FxHashMap<TypeId, Vec<AspectDescriptor>>,
    plans: RwLock<FxHashMap<PlanCacheKey, Option<Arc<InterceptedCallPlan>>>>,
}

impl ProxyFactory {
    pub fn new(aspects: Vec<AspectDescriptor>) -> Self {
        Self {
            aspects: aspects
                .into_iter()
                .into_group_map_by(|aspect| aspect.target.id)
                .into_iter()
                .collect(),
            plans: Default::default(),
        }
    }

    #[inline]
    pub fn has_aspects(&self, target: TypeId) -> bool {
        self.aspects.contains_key(&target)
    }

    /// Returns the plan for instances of `target` exposed as `exposed`, or `None` if they don't
    /// need a proxy. The plan is computed once per pair.
    pub fn plan(
        &self,
        target: TypeKey,
        exposed: TypeKey,
        surface: Option<&'static InterceptionSurface>,
    ) -> Result<Option<Arc<InterceptedCallPlan>>, ProxyGenerationError> {
        let Some(aspects) = self.aspects.get(&target.id) else {
            return Ok(None);
        };

        let Some(surface) = surface else {
            return Err(ProxyGenerationError::NotExtensible {
                type_name: target.name,
                exposed_as: exposed.name,
            });
        };

        let key = (target.id, exposed.id);
        if let Some(plan) = self.plans.read().get(&key) {
            return Ok(plan.clone());
        }

        Ok(self
            .plans
            .write()
            .entry(key)
            .or_insert_with(|| {
                let plan = InterceptedCallPlan::build(target, surface, aspects).map(Arc::new);
                debug!(
                    type_name = target.name,
                    surface = surface.name,
                    intercepted = plan.is_some(),
                    "Built interception plan"
                );
                plan
            })
            .clone())
    }
}
