use crate::config::{ConfigError, Instance, InstanceGroups};
use std::{collections::HashSet, num::NonZeroUsize};

/// Default number of partitions per endpoint.
pub const DEFAULT_PARTITIONS: NonZeroUsize = match NonZeroUsize::new(32) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

/// Split the instances of the `targets` groups across `count` partitions.
///
/// Instances are dealt round-robin in target order, then in group order.
/// This bounds how many instances one endpoint scrapes at once; it does not
/// balance by query cost. Exactly `count` partitions are returned and some may
/// be empty.
///
/// # Errors
///
/// Returns an error if a target group does not exist or an instance name is
/// shared by two target groups.
pub fn partition(
    endpoint: &str,
    groups: &InstanceGroups,
    targets: &[String],
    count: NonZeroUsize,
) -> Result<Vec<Vec<Instance>>, ConfigError> {
    let mut partitions: Vec<Vec<Instance>> = vec![Vec::new(); count.get()];
    let mut seen = HashSet::new();
    let mut next = 0usize;

    for target in targets {
        let group = groups.get(target).ok_or_else(|| ConfigError::UnknownTarget {
            endpoint: endpoint.to_string(),
            target: target.clone(),
        })?;

        for instance in group {
            if !seen.insert(instance.name.as_str()) {
                return Err(ConfigError::DuplicateInstance {
                    endpoint: endpoint.to_string(),
                    instance: instance.name.clone(),
                });
            }

            if let Some(slot) = partitions.get_mut(next % count.get()) {
                slot.push(instance.clone());
            }
            next += 1;
        }
    }

    Ok(partitions)
}
