//! Status transition policy.

use orderq_types::OrderStatus;

/// Returns true if an order may move from `current` to `requested`.
///
/// Only strictly heavier statuses are reachable, so skipping ahead is
/// allowed, going back is not, and the terminal statuses have no exits.
pub fn is_transition_valid(current: OrderStatus, requested: OrderStatus) -> bool {
	requested.weight() > current.weight()
}

#[cfg(test)]
mod tests {
	use super::*;
	use OrderStatus::*;

	#[test]
	fn test_forward_steps_are_valid() {
		assert!(is_transition_valid(Pending, Preparing));
		assert!(is_transition_valid(Preparing, Ready));
		assert!(is_transition_valid(Ready, Done));
		assert!(is_transition_valid(Ready, Cancelled));
		assert!(is_transition_valid(Pending, Cancelled));
		assert!(is_transition_valid(Pending, Done));
	}

	#[test]
	fn test_non_increasing_steps_are_invalid() {
		for current in OrderStatus::ALL {
			for requested in OrderStatus::ALL {
				if requested.weight() <= current.weight() {
					assert!(
						!is_transition_valid(current, requested),
						"{} -> {} must be rejected",
						current,
						requested
					);
				}
			}
		}
	}

	#[test]
	fn test_terminal_statuses_have_no_exit() {
		for requested in OrderStatus::ALL {
			assert!(!is_transition_valid(Done, requested));
			assert!(!is_transition_valid(Cancelled, requested));
		}
	}
}
