use anyhow::{Context, Result};
use ratemap::{Extent, RateMap, ZoneWeights};
use tracing::{debug, info};

/// Lifecycle of the render target set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResourceState {
    /// Targets match the requested configuration.
    Clean,
    /// Configuration changed; targets are rebuilt at the next frame boundary.
    Dirty,
    /// A rebuild started and has not completed. Stays here if allocation fails.
    Rebuilding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RebuildOutcome {
    Unchanged,
    Rebuilt,
}

/// Everything the allocator needs to build a target set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TargetPlan {
    pub logical: Extent,
    /// Map used when VRR is on; its physical size sizes the physical target.
    pub vrr: RateMap,
    /// Map bound while VRR is off (physical == logical).
    pub identity: RateMap,
}

impl TargetPlan {
    pub fn new(logical: Extent, weights: ZoneWeights) -> Result<Self> {
        let vrr = RateMap::new(logical, weights)
            .with_context(|| format!("failed to build rate map for {logical}"))?;
        let identity = RateMap::identity(logical)
            .with_context(|| format!("failed to build identity rate map for {logical}"))?;
        Ok(Self {
            logical,
            vrr,
            identity,
        })
    }

    pub fn physical(&self) -> Extent {
        self.vrr.physical_size()
    }

    pub fn rate_map(&self, use_vrr: bool) -> &RateMap {
        if use_vrr {
            &self.vrr
        } else {
            &self.identity
        }
    }
}

/// Owns the render targets and decides when they must be rebuilt.
///
/// Configuration changes only mark the set dirty; the rebuild itself happens
/// in [`ResourceManager::ensure_ready`], which the frame loop calls once per
/// frame before encoding. The previous set stays in use until a replacement
/// has been fully allocated.
pub(crate) struct ResourceManager<T> {
    logical: Extent,
    weights: ZoneWeights,
    use_vrr: bool,
    state: ResourceState,
    plan: Option<TargetPlan>,
    targets: Option<T>,
    debug_pending: bool,
    generation: u64,
}

impl<T> ResourceManager<T> {
    pub fn new(logical: Extent, weights: ZoneWeights, use_vrr: bool) -> Self {
        Self {
            logical,
            weights,
            use_vrr,
            state: ResourceState::Dirty,
            plan: None,
            targets: None,
            debug_pending: false,
            generation: 0,
        }
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    /// Number of completed rebuilds.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn plan(&self) -> Option<&TargetPlan> {
        self.plan.as_ref()
    }

    pub fn targets(&self) -> Option<&T> {
        self.targets.as_ref()
    }

    /// Record the requested logical size and zone weights.
    pub fn configure(&mut self, logical: Extent, weights: ZoneWeights) {
        if logical == self.logical && weights == self.weights {
            return;
        }
        debug!(
            from = %self.logical,
            to = %logical,
            "render target configuration changed"
        );
        self.logical = logical;
        self.weights = weights;
        if self.state == ResourceState::Clean {
            self.state = ResourceState::Dirty;
        }
    }

    /// Switch between the physical and logical target. Both already exist,
    /// so only the statistics readback is re-armed.
    pub fn set_use_vrr(&mut self, enabled: bool) {
        if enabled != self.use_vrr {
            self.use_vrr = enabled;
            self.debug_pending = true;
        }
    }

    /// Rebuild the target set if the configuration changed since the last
    /// call. Cheap and idempotent when nothing changed.
    pub fn ensure_ready<F>(&mut self, allocate: F) -> Result<RebuildOutcome>
    where
        F: FnOnce(&TargetPlan) -> Result<T>,
    {
        if self.state == ResourceState::Clean && self.targets.is_some() {
            return Ok(RebuildOutcome::Unchanged);
        }

        self.state = ResourceState::Rebuilding;
        let plan = TargetPlan::new(self.logical, self.weights)?;
        let targets = allocate(&plan).context("failed to allocate render targets")?;

        self.targets = Some(targets);
        self.plan = Some(plan);
        self.state = ResourceState::Clean;
        self.debug_pending = true;
        self.generation += 1;
        info!(
            logical = %plan.logical,
            physical = %plan.physical(),
            generation = self.generation,
            "render targets rebuilt"
        );
        Ok(RebuildOutcome::Rebuilt)
    }

    /// Ask for a statistics readback on the next frame.
    pub fn request_statistics(&mut self) {
        self.debug_pending = true;
    }

    /// Consume the pending-readback flag.
    pub fn take_debug_pending(&mut self) -> bool {
        std::mem::take(&mut self.debug_pending)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    fn manager() -> ResourceManager<Extent> {
        ResourceManager::new(Extent::new(1024, 1024), ZoneWeights::default(), true)
    }

    #[test]
    fn ensure_ready_allocates_once_for_unchanged_config() {
        let mut resources = manager();
        let mut allocations = 0;

        let outcome = resources
            .ensure_ready(|plan| {
                allocations += 1;
                Ok(plan.physical())
            })
            .unwrap();
        assert_eq!(outcome, RebuildOutcome::Rebuilt);
        let first = *resources.targets().unwrap();

        let outcome = resources
            .ensure_ready(|plan| {
                allocations += 1;
                Ok(plan.physical())
            })
            .unwrap();
        assert_eq!(outcome, RebuildOutcome::Unchanged);
        assert_eq!(allocations, 1);
        assert_eq!(*resources.targets().unwrap(), first);
        assert_eq!(first, Extent::new(640, 640));
        assert_eq!(resources.state(), ResourceState::Clean);
        assert_eq!(resources.generation(), 1);
    }

    #[test]
    fn configure_only_dirties_on_change() {
        let mut resources = manager();
        resources.ensure_ready(|plan| Ok(plan.physical())).unwrap();

        resources.configure(Extent::new(1024, 1024), ZoneWeights::default());
        assert_eq!(resources.state(), ResourceState::Clean);

        resources.configure(Extent::new(2048, 1024), ZoneWeights::default());
        assert_eq!(resources.state(), ResourceState::Dirty);
        // Old targets stay usable until the next frame boundary.
        assert_eq!(*resources.targets().unwrap(), Extent::new(640, 640));

        resources.ensure_ready(|plan| Ok(plan.physical())).unwrap();
        assert_eq!(*resources.targets().unwrap(), Extent::new(1280, 640));
        assert_eq!(resources.plan().unwrap().logical, Extent::new(2048, 1024));
    }

    #[test]
    fn rebuild_and_vrr_toggle_arm_debug_readback_once() {
        let mut resources = manager();
        assert!(!resources.take_debug_pending());

        resources.ensure_ready(|plan| Ok(plan.physical())).unwrap();
        assert!(resources.take_debug_pending());
        assert!(!resources.take_debug_pending());

        resources.set_use_vrr(true);
        assert!(!resources.take_debug_pending());
        resources.set_use_vrr(false);
        assert!(resources.take_debug_pending());
        assert_eq!(resources.state(), ResourceState::Clean);

        resources.request_statistics();
        assert!(resources.take_debug_pending());
    }

    #[test]
    fn failed_allocation_keeps_previous_targets() {
        let mut resources = manager();
        resources.ensure_ready(|plan| Ok(plan.physical())).unwrap();

        resources.configure(Extent::new(512, 512), ZoneWeights::default());
        let err = resources
            .ensure_ready(|_| Err(anyhow!("out of memory")))
            .unwrap_err();
        assert!(format!("{err:#}").contains("out of memory"));
        assert_eq!(resources.state(), ResourceState::Rebuilding);
        assert_eq!(*resources.targets().unwrap(), Extent::new(640, 640));

        resources.ensure_ready(|plan| Ok(plan.physical())).unwrap();
        assert_eq!(resources.state(), ResourceState::Clean);
        assert_eq!(*resources.targets().unwrap(), Extent::new(320, 320));
    }

    #[test]
    fn invalid_weights_fail_the_rebuild() {
        let mut resources: ResourceManager<Extent> =
            ResourceManager::new(Extent::new(1024, 1024), ZoneWeights::periphery(2.0), true);
        let err = resources
            .ensure_ready(|plan| Ok(plan.physical()))
            .unwrap_err();
        assert!(format!("{err:#}").contains("weight"));
        assert!(resources.targets().is_none());
    }

    #[test]
    fn identity_plan_matches_logical_size() {
        let plan = TargetPlan::new(Extent::new(768, 512), ZoneWeights::default()).unwrap();
        assert!(plan.rate_map(false).is_identity());
        assert_eq!(plan.rate_map(false).physical_size(), plan.logical);
        assert!(plan.physical().width < 768);
    }
}
