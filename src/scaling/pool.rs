// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Sub-family-flexible instance pools.
//!
//! For mixed-instances placement, every offered instance type anchors a pool
//! of interchangeable siblings: types sharing the anchor's family and
//! generation, architecture set, vCPU count and memory size. The anchor
//! always leads its own pool, so a type with no siblings still yields a
//! singleton.
//!
//! Family and generation derive from the first dot-separated segment of the
//! type name: the family is its alphabetic prefix, the generation is the
//! first numeric run. A name with fewer than two dot segments or no numeric
//! run yields empty family and generation, and such a type only ever pools
//! with itself.

use std::collections::BTreeMap;

use crate::cloud::types::{InstanceTypeInfo, PoolInstance};

/// Weight assigned to every pool member.
const POOL_WEIGHT: &str = "1";

/// Split an instance type name into family and generation.
///
/// # Examples
///
/// ```rust
/// use instancemgr::scaling::pool::family_and_generation;
///
/// assert_eq!(family_and_generation("m5a.large"), ("m".to_string(), "5".to_string()));
/// assert_eq!(family_and_generation("c6gn.xlarge"), ("c".to_string(), "6".to_string()));
/// assert_eq!(family_and_generation("weird"), (String::new(), String::new()));
/// ```
#[must_use]
pub fn family_and_generation(instance_type: &str) -> (String, String) {
    let mut segments = instance_type.split('.');
    let first = segments.next().unwrap_or_default();
    if segments.next().is_none() {
        return (String::new(), String::new());
    }

    let family: String = first.chars().take_while(|c| c.is_ascii_alphabetic()).collect();

    let generation: String = first
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();

    if generation.is_empty() {
        return (String::new(), String::new());
    }

    (family, generation)
}

/// Derive the sub-family-flexible pool for every offered type.
///
/// # Arguments
///
/// * `offerings` - instance types available in the region
/// * `type_infos` - architecture/vcpu/memory catalog
///
/// # Returns
///
/// Map from anchor type to its ordered pool: the anchor first, then every
/// other offered type sharing family, generation, architectures, vCPUs and
/// memory, in offering order. All members carry weight `"1"`.
#[must_use]
pub fn sub_family_flexible_pools(
    offerings: &[String],
    type_infos: &[InstanceTypeInfo],
) -> BTreeMap<String, Vec<PoolInstance>> {
    let info_of = |name: &str| type_infos.iter().find(|i| i.instance_type == name);

    let mut pools = BTreeMap::new();

    for anchor in offerings {
        let mut members = vec![PoolInstance {
            instance_type: anchor.clone(),
            weight: POOL_WEIGHT.to_string(),
        }];

        let (family, generation) = family_and_generation(anchor);
        let anchor_info = info_of(anchor);

        // A type outside the family/generation scheme, or missing from the
        // catalog, pools only with itself.
        if !family.is_empty() {
            if let Some(anchor_info) = anchor_info {
                for candidate in offerings {
                    if candidate == anchor {
                        continue;
                    }
                    if family_and_generation(candidate) != (family.clone(), generation.clone()) {
                        continue;
                    }
                    let Some(candidate_info) = info_of(candidate) else {
                        continue;
                    };

                    let mut anchor_archs = anchor_info.architectures.clone();
                    let mut candidate_archs = candidate_info.architectures.clone();
                    anchor_archs.sort();
                    candidate_archs.sort();

                    if anchor_archs == candidate_archs
                        && anchor_info.vcpus == candidate_info.vcpus
                        && anchor_info.memory_mib == candidate_info.memory_mib
                    {
                        members.push(PoolInstance {
                            instance_type: candidate.clone(),
                            weight: POOL_WEIGHT.to_string(),
                        });
                    }
                }
            }
        }

        pools.insert(anchor.clone(), members);
    }

    pools
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod pool_tests;
