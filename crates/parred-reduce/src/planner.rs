use parred_runtime::{kernel::Pipeline, server::Dispatch};

use crate::ReduceError;

/// Launch shape for `active_units` work-items: one work-item per active unit, in groups as
/// large as the device allows.
pub fn plan(active_units: u32, max_group_size: u32) -> Dispatch {
    Dispatch::new(active_units, max_group_size.min(active_units))
}

/// Parameters of one step of the interleaved addressing strategy.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterleavedStep {
    /// Distance between the two slots a work-item folds.
    pub stride: u32,
    /// Distance between the slots of two neighbouring work-items.
    pub offset: u32,
    /// Number of work-items of the step.
    pub active_units: u32,
}

/// The `log2(length)` steps of the interleaved strategy.
///
/// # Panics
///
/// If `length` is zero.
pub fn interleaved_steps(length: u32) -> impl Iterator<Item = InterleavedStep> {
    (0..length.ilog2()).map(move |step| {
        let stride = 1 << step;
        let offset = stride * 2;
        InterleavedStep::new(stride, offset, length / offset)
    })
}

/// Active units of the `log2(length)` steps of the sequential strategy.
///
/// # Panics
///
/// If `length` is zero.
pub fn sequential_steps(length: u32) -> impl Iterator<Item = u32> {
    (1..=length.ilog2()).map(move |step| length >> step)
}

/// Geometry of the group-decomposed strategy.
///
/// Each work-item folds two elements while loading them into shared memory, so a group of
/// `group_width` work-items owns a slice of `2 * group_width` elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecompositionConfig {
    /// Number of elements reduced by the launch.
    pub elements: u32,
    /// Work-items per group, also the number of shared memory slots per group.
    pub group_width: u32,
    /// Work-items of the launch.
    pub work_items: u32,
    /// Groups of the launch, one partial sum each.
    pub groups: u32,
}

impl DecompositionConfig {
    /// Derive the geometry for `elements` from the limits of the decomposition pipeline.
    ///
    /// The group width is the plane width, capped by the maximum group size and by the
    /// number of work-items, and rounded down to a power of two for the tree reduction.
    pub fn generate(
        elements: u32,
        pipeline: &Pipeline,
        max_shared_memory_bytes: usize,
    ) -> Result<DecompositionConfig, ReduceError> {
        Self::from_limits(
            elements,
            pipeline.max_group_size(),
            pipeline.plane_dim(),
            max_shared_memory_bytes,
        )
    }

    fn from_limits(
        elements: u32,
        max_group_size: u32,
        plane_dim: u32,
        max_shared_memory_bytes: usize,
    ) -> Result<DecompositionConfig, ReduceError> {
        if elements < 2 || !elements.is_power_of_two() {
            return Err(ReduceError::InvalidDecomposition {
                reason: format!("{elements} elements can't be split in pairs of power of two"),
            });
        }

        let preferred = match plane_dim {
            0 => max_group_size,
            plane_dim => plane_dim,
        };
        let work_items = elements / 2;
        let width = preferred.min(max_group_size).min(work_items);
        if width == 0 {
            return Err(ReduceError::InvalidDecomposition {
                reason: "the device can't launch any work-item".to_string(),
            });
        }
        let group_width = 1 << width.ilog2();

        let config = DecompositionConfig {
            elements,
            group_width,
            work_items,
            groups: work_items / group_width,
        };

        if config.shared_memory_size() > max_shared_memory_bytes {
            return Err(ReduceError::InvalidDecomposition {
                reason: format!(
                    "{} bytes of shared memory per group, the device provides {}",
                    config.shared_memory_size(),
                    max_shared_memory_bytes
                ),
            });
        }

        Ok(config)
    }

    /// Launch shape of the decomposition kernel.
    pub fn dispatch(&self) -> Dispatch {
        Dispatch::new(self.work_items, self.group_width)
    }

    /// Bytes of shared memory per group.
    pub fn shared_memory_size(&self) -> usize {
        self.group_width as usize * size_of::<f32>()
    }

    /// Slot of the working buffer holding the partial sum of group `group_pos`.
    pub fn partial_index(&self, group_pos: u32) -> u32 {
        group_pos * 2 * self.group_width
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decomposition::KernelDecomposition;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn generate(
        elements: u32,
        max_group_size: u32,
        plane_dim: u32,
    ) -> Result<DecompositionConfig, ReduceError> {
        DecompositionConfig::from_limits(elements, max_group_size, plane_dim, 32768)
    }

    #[test]
    fn group_size_is_capped_by_active_units() {
        assert_eq!(plan(1024, 256), Dispatch::new(1024, 256));
        assert_eq!(plan(2, 256), Dispatch::new(2, 2));
        assert_eq!(plan(1, 256), Dispatch::new(1, 1));
    }

    #[test]
    fn interleaved_steps_double_the_stride() {
        let steps: Vec<_> = interleaved_steps(8).collect();

        assert_eq!(
            steps,
            vec![
                InterleavedStep::new(1, 2, 4),
                InterleavedStep::new(2, 4, 2),
                InterleavedStep::new(4, 8, 1),
            ]
        );
    }

    #[test]
    fn sequential_steps_halve_the_active_units() {
        assert_eq!(sequential_steps(16).collect::<Vec<_>>(), vec![8, 4, 2, 1]);
    }

    #[test]
    fn single_element_needs_no_step() {
        assert_eq!(interleaved_steps(1).count(), 0);
        assert_eq!(sequential_steps(1).count(), 0);
    }

    #[test]
    fn decomposition_matches_the_reference_device() {
        let config = generate(512, 256, 32).unwrap();

        assert_eq!(
            config,
            DecompositionConfig {
                elements: 512,
                group_width: 32,
                work_items: 256,
                groups: 8,
            }
        );
        assert_eq!(config.dispatch(), Dispatch::new(256, 32));
        assert_eq!(config.shared_memory_size(), 128);
        assert_eq!(config.partial_index(3), 192);
    }

    #[test]
    fn decomposition_follows_the_device() {
        let narrow = generate(512, 16, 32).unwrap();
        assert_eq!(narrow.group_width, 16);
        assert_eq!(narrow.groups, 16);

        let odd_plane = generate(512, 256, 24).unwrap();
        assert_eq!(odd_plane.group_width, 16);

        let tiny = generate(8, 256, 32).unwrap();
        assert_eq!(tiny.group_width, 4);
        assert_eq!(tiny.groups, 1);
    }

    #[test]
    fn decomposition_rejects_unsplittable_lengths() {
        for elements in [0, 1, 384] {
            assert!(matches!(
                generate(elements, 256, 32),
                Err(ReduceError::InvalidDecomposition { .. })
            ));
        }
    }

    #[test]
    fn decomposition_follows_the_pipeline_limits() {
        let pipeline = Pipeline::new(Arc::new(KernelDecomposition), 16, 32);
        let config = DecompositionConfig::generate(512, &pipeline, 32768).unwrap();

        assert_eq!(config.group_width, 16);
        assert_eq!(config.dispatch(), Dispatch::new(256, 16));
    }

    #[test]
    fn decomposition_rejects_groups_beyond_shared_memory() {
        assert!(matches!(
            DecompositionConfig::from_limits(512, 256, 32, 64),
            Err(ReduceError::InvalidDecomposition { .. })
        ));
    }
}
