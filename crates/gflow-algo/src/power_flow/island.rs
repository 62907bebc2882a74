//! Island detection.
//!
//! Islands are the connected components of the active bus-bus graph. Each one
//! becomes a self-contained [`CalculationInputs`] sliced out of the compiled
//! network; admittances are sliced, not reassembled.

use super::inputs::CalculationInputs;
use gflow_core::{connected_components, FlowResult, Logger};

/// Partition `inputs` into islands.
///
/// A network that forms a single component is returned whole (inactive buses
/// included). With `ignore_single_node_islands` isolated buses are dropped.
pub fn split_islands(
    inputs: &CalculationInputs,
    ignore_single_node_islands: bool,
    logger: &mut Logger,
) -> FlowResult<Vec<CalculationInputs>> {
    let edges: Vec<Option<(usize, usize)>> = inputs
        .admittance
        .branches()
        .iter()
        .map(|br| br.active.then_some((br.from, br.to)))
        .collect();
    let components = connected_components(&inputs.bus_active, &edges);

    if components.len() == 1 && components[0].buses.len() == inputs.n_bus {
        return Ok(vec![inputs.clone()]);
    }

    let mut islands = Vec::with_capacity(components.len());
    for component in components {
        if ignore_single_node_islands && component.buses.len() == 1 {
            logger.progress(format!(
                "dropping single-bus island {}",
                inputs.bus_names[component.buses[0]]
            ));
            continue;
        }
        islands.push(inputs.slice(&component.buses, &component.branches)?);
    }

    logger.progress(format!("{} islands detected", islands.len()));
    Ok(islands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gflow_core::{BranchData, BusData, NetworkSnapshot};
    use num_complex::Complex64;
    use std::collections::BTreeSet;

    fn two_islands() -> CalculationInputs {
        let mut net = NetworkSnapshot::new("split");
        let a = net.add_bus(BusData::slack("A", 1.0));
        let b = net.add_bus(BusData::pq("B", Complex64::new(-0.1, 0.0)));
        let c = net.add_bus(BusData::slack("C", 1.0));
        let d = net.add_bus(BusData::pq("D", Complex64::new(-0.2, 0.0)));
        net.add_bus(BusData::pq("E", Complex64::new(0.0, 0.0)));
        net.add_branch(BranchData::line(a, b, 0.01, 0.1, 0.0));
        net.add_branch(BranchData::line(c, d, 0.01, 0.1, 0.0));
        net.add_branch(BranchData::line(b, c, 0.01, 0.1, 0.0).with_active(false));
        CalculationInputs::compile(&net).unwrap()
    }

    #[test]
    fn test_islands_partition_buses() {
        let inputs = two_islands();
        let islands = split_islands(&inputs, false, &mut Logger::default()).unwrap();
        assert_eq!(islands.len(), 3);

        let mut seen = BTreeSet::new();
        for island in &islands {
            for &i in &island.original_bus_idx {
                assert!(seen.insert(i), "bus {} appears in two islands", i);
            }
        }
        assert_eq!(seen.len(), inputs.n_bus);
        assert_eq!(islands[0].original_branch_idx, vec![0]);
        assert_eq!(islands[1].original_branch_idx, vec![1]);
    }

    #[test]
    fn test_single_node_islands_dropped() {
        let inputs = two_islands();
        let islands = split_islands(&inputs, true, &mut Logger::default()).unwrap();
        assert_eq!(islands.len(), 2);
        assert!(islands.iter().all(|isl| isl.n_bus == 2));
    }

    #[test]
    fn test_connected_network_is_one_island() {
        let mut net = NetworkSnapshot::new("one");
        let a = net.add_bus(BusData::slack("A", 1.0));
        let b = net.add_bus(BusData::pq("B", Complex64::new(-0.1, 0.0)));
        net.add_branch(BranchData::line(a, b, 0.01, 0.1, 0.0));
        let inputs = CalculationInputs::compile(&net).unwrap();
        let islands = split_islands(&inputs, false, &mut Logger::default()).unwrap();
        assert_eq!(islands.len(), 1);
        assert_eq!(islands[0].original_bus_idx, vec![0, 1]);
    }

    #[test]
    fn test_sliced_island_admittance_matches_parent() {
        let inputs = two_islands();
        let islands = split_islands(&inputs, false, &mut Logger::default()).unwrap();
        let second = &islands[1];
        for (li, &gi) in second.original_bus_idx.iter().enumerate() {
            for (lj, &gj) in second.original_bus_idx.iter().enumerate() {
                assert_eq!(second.admittance.ybus.get(li, lj), inputs.admittance.ybus.get(gi, gj));
            }
        }
    }
}
