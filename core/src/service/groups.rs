//! Sharing group topology
//!
//! A server's groups come back in configuration order: the first one is the primary group
//! and is authoritative for loads, while saves go to every group.

use crate::config::AppConfig;
use crate::domain::{GroupName, ServerId};
use indexmap::{IndexMap, IndexSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupResolver {
	groups: IndexMap<GroupName, Vec<ServerId>>,
}

impl GroupResolver {
	pub fn new(groups: IndexMap<GroupName, Vec<ServerId>>) -> Self {
		Self { groups }
	}

	pub fn from_config(config: &AppConfig) -> Self {
		let groups = config
			.sharing_groups
			.iter()
			.map(|(name, members)| {
				let members = members.iter().map(|m| ServerId::new(m.trim())).collect();
				(GroupName::new(name.trim()), members)
			})
			.collect();
		Self { groups }
	}

	/// Every group listing `server`, in configuration order
	pub fn groups_of(&self, server: &ServerId) -> Vec<GroupName> {
		self.groups
			.iter()
			.filter(|(_, members)| members.contains(server))
			.map(|(name, _)| name.clone())
			.collect()
	}

	pub fn primary_group_of(&self, server: &ServerId) -> Option<GroupName> {
		self.groups
			.iter()
			.find(|(_, members)| members.contains(server))
			.map(|(name, _)| name.clone())
	}

	/// Other members across all of `server`'s groups, deduplicated
	pub fn peers_of(&self, server: &ServerId) -> IndexSet<ServerId> {
		self.groups
			.values()
			.filter(|members| members.contains(server))
			.flatten()
			.filter(|member| *member != server)
			.cloned()
			.collect()
	}

	pub fn contains_group(&self, group: &GroupName) -> bool {
		self.groups.contains_key(group)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	fn resolver() -> GroupResolver {
		let config = AppConfig::parse(
			r#"
server-id = "a"

[sharing-groups]
survival = ["a", "b"]
economy = ["c", "a", "b"]
creative = ["d"]
"#,
		)
		.unwrap();
		GroupResolver::from_config(&config)
	}

	#[test]
	fn test_groups_follow_configuration_order() {
		let resolver = resolver();
		assert_eq!(
			resolver.groups_of(&"a".into()),
			vec![GroupName::new("survival"), GroupName::new("economy")]
		);
		assert_eq!(resolver.primary_group_of(&"c".into()), Some(GroupName::new("economy")));
	}

	#[test]
	fn test_peers_are_deduplicated_and_exclude_self() {
		let resolver = resolver();
		let peers: Vec<_> = resolver.peers_of(&"a".into()).into_iter().collect();
		assert_eq!(peers, vec![ServerId::new("b"), ServerId::new("c")]);
		assert!(resolver.peers_of(&"d".into()).is_empty());
	}

	#[test]
	fn test_unmapped_server_has_no_groups() {
		let resolver = resolver();
		assert!(resolver.groups_of(&"unknown".into()).is_empty());
		assert_eq!(resolver.primary_group_of(&"unknown".into()), None);
		assert!(resolver.peers_of(&"unknown".into()).is_empty());
	}
}
