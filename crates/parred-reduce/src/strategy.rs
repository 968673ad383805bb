use core::fmt::Display;
use core::str::FromStr;

use parred_runtime::{Runtime, client::ComputeClient};
use serde::{Deserialize, Serialize};

use crate::{ReduceError, library};

/// How the elements of the working buffer are combined.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReduceStrategy {
    /// One launch per halving step, work-item `i` folding `i * offset + stride` into
    /// `i * offset`. Strided accesses, kept as the baseline.
    Interleaved,
    /// One launch per halving step, work-item `i` folding `i + active` into `i`, so that
    /// neighbouring work-items read neighbouring slots.
    Sequential,
    /// A single launch where every group tree-reduces its slice in shared memory.
    GroupDecomposed,
    /// A single launch where every plane sums its lanes and accumulates atomically.
    #[default]
    SubgroupReduced,
}

impl ReduceStrategy {
    /// Every strategy, from the slowest to the fastest.
    pub const ALL: [ReduceStrategy; 4] = [
        ReduceStrategy::Interleaved,
        ReduceStrategy::Sequential,
        ReduceStrategy::GroupDecomposed,
        ReduceStrategy::SubgroupReduced,
    ];

    /// Check that the device can run the strategy.
    pub fn validate<R: Runtime>(
        self,
        client: &ComputeClient<R::Server>,
    ) -> Result<Self, ReduceError> {
        if self.use_planes() && !client.properties().subgroups {
            return Err(ReduceError::PlanesUnavailable);
        }

        Ok(self)
    }

    /// If the strategy relies on plane instructions.
    pub fn use_planes(&self) -> bool {
        matches!(self, ReduceStrategy::SubgroupReduced)
    }

    /// Name of the kernel entry point implementing the strategy.
    pub fn entry_point(&self) -> &'static str {
        match self {
            ReduceStrategy::Interleaved => library::INTERLEAVED_ADDRESSING,
            ReduceStrategy::Sequential => library::SEQUENTIAL_ADDRESSING,
            ReduceStrategy::GroupDecomposed => library::KERNEL_DECOMPOSITION,
            ReduceStrategy::SubgroupReduced => library::REDUCE_SUM,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ReduceStrategy::Interleaved => "interleaved",
            ReduceStrategy::Sequential => "sequential",
            ReduceStrategy::GroupDecomposed => "group_decomposed",
            ReduceStrategy::SubgroupReduced => "subgroup_reduced",
        }
    }
}

impl Display for ReduceStrategy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReduceStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let name = value.trim().to_lowercase();
        ReduceStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == name)
            .ok_or_else(|| {
                format!(
                    "Unknown reduce strategy `{value}`, expected one of {}",
                    ReduceStrategy::ALL.map(|strategy| strategy.as_str()).join(", ")
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_names_round_trip_through_from_str() {
        for strategy in ReduceStrategy::ALL {
            assert_eq!(strategy.to_string().parse::<ReduceStrategy>(), Ok(strategy));
        }
        assert_eq!(
            " Group_Decomposed ".parse::<ReduceStrategy>(),
            Ok(ReduceStrategy::GroupDecomposed)
        );
    }

    #[test]
    fn unknown_strategy_lists_the_valid_names() {
        let err = "tree".parse::<ReduceStrategy>().unwrap_err();

        assert!(err.contains("interleaved, sequential, group_decomposed, subgroup_reduced"));
    }

    #[test]
    fn serde_uses_the_same_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            strategy: ReduceStrategy,
        }

        let wrapper: Wrapper = toml::from_str("strategy = \"sequential\"").unwrap();
        assert_eq!(wrapper.strategy, ReduceStrategy::Sequential);
    }
}
