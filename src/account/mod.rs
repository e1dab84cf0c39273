//! Account handles, the registry contract the journal delegates to, and an
//! in-memory tree implementing it.

use std::{collections::HashMap, fmt};

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Separator between segments of a fully qualified account name.
pub const ACCOUNT_SEPARATOR: char = ':';

/// Non-owning handle to an account node held by an [`AccountRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A single node in the account tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub parent: Option<AccountId>,
    #[serde(default)]
    pub children: Vec<AccountId>,
}

impl Account {
    /// Creates a top-level account; the registry attaches it below its root.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: AccountId::new(),
            name: name.into(),
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn child_of(parent: AccountId, name: impl Into<String>) -> Self {
        Self {
            parent: Some(parent),
            ..Self::new(name)
        }
    }
}

/// Session-level account store the journal forwards account operations to.
///
/// Creation-on-miss and pattern matching rules belong to the implementor.
pub trait AccountRegistry {
    fn root(&self) -> AccountId;
    fn add_account(&mut self, account: Account) -> AccountId;
    fn remove_account(&mut self, id: AccountId) -> bool;
    fn find_account_from(
        &mut self,
        start: AccountId,
        name: &str,
        auto_create: bool,
    ) -> Option<AccountId>;
    fn find_account_re(&self, pattern: &Regex) -> Option<AccountId>;
    fn contains(&self, id: AccountId) -> bool;
    fn full_name(&self, id: AccountId) -> Option<String>;
    /// True when `id` is `from` or one of its descendants.
    fn is_reachable(&self, from: AccountId, id: AccountId) -> bool;

    fn find_account(&mut self, name: &str, auto_create: bool) -> Option<AccountId> {
        let root = self.root();
        self.find_account_from(root, name, auto_create)
    }
}

/// Arena-backed account tree keyed by [`AccountId`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountTree {
    root: AccountId,
    accounts: HashMap<AccountId, Account>,
}

impl Default for AccountTree {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountTree {
    pub fn new() -> Self {
        let root = Account::new("");
        let id = root.id;
        let mut accounts = HashMap::new();
        accounts.insert(id, root);
        Self { root: id, accounts }
    }

    /// Number of accounts, excluding the root.
    pub fn len(&self) -> usize {
        self.accounts.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn child_named(&self, parent: AccountId, name: &str) -> Option<AccountId> {
        let node = self.accounts.get(&parent)?;
        node.children
            .iter()
            .copied()
            .find(|child| self.accounts.get(child).is_some_and(|a| a.name == name))
    }

    fn attach(&mut self, mut account: Account, parent: AccountId) -> AccountId {
        let id = account.id;
        account.parent = Some(parent);
        account.children.clear();
        if let Some(node) = self.accounts.get_mut(&parent) {
            node.children.push(id);
        }
        self.accounts.insert(id, account);
        id
    }

    fn depth_first(&self) -> Vec<AccountId> {
        let mut order = Vec::with_capacity(self.accounts.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if id != self.root {
                order.push(id);
            }
            if let Some(node) = self.accounts.get(&id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        order
    }
}

impl AccountRegistry for AccountTree {
    fn root(&self) -> AccountId {
        self.root
    }

    /// Attaches `account` below its parent, or below the root when the parent
    /// is unset or unknown. A sibling with the same name wins over the new node.
    fn add_account(&mut self, account: Account) -> AccountId {
        let parent = account
            .parent
            .filter(|parent| self.accounts.contains_key(parent))
            .unwrap_or(self.root);
        if let Some(existing) = self.child_named(parent, &account.name) {
            return existing;
        }
        self.attach(account, parent)
    }

    fn remove_account(&mut self, id: AccountId) -> bool {
        if id == self.root {
            return false;
        }
        let Some(node) = self.accounts.get(&id) else {
            return false;
        };
        if let Some(parent) = node.parent.and_then(|p| self.accounts.get_mut(&p)) {
            parent.children.retain(|child| *child != id);
        }
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(removed) = self.accounts.remove(&next) {
                pending.extend(removed.children);
            }
        }
        true
    }

    fn find_account_from(
        &mut self,
        start: AccountId,
        name: &str,
        auto_create: bool,
    ) -> Option<AccountId> {
        if !self.accounts.contains_key(&start) {
            return None;
        }
        let mut current = start;
        for segment in name.split(ACCOUNT_SEPARATOR).map(str::trim) {
            if segment.is_empty() {
                return None;
            }
            current = match self.child_named(current, segment) {
                Some(child) => child,
                None if auto_create => self.attach(Account::new(segment), current),
                None => return None,
            };
        }
        Some(current)
    }

    fn find_account_re(&self, pattern: &Regex) -> Option<AccountId> {
        self.depth_first().into_iter().find(|id| {
            self.full_name(*id)
                .is_some_and(|name| pattern.is_match(&name))
        })
    }

    fn contains(&self, id: AccountId) -> bool {
        self.accounts.contains_key(&id)
    }

    fn full_name(&self, id: AccountId) -> Option<String> {
        let mut segments = Vec::new();
        let mut cursor = self.accounts.get(&id)?;
        loop {
            if cursor.id != self.root {
                segments.push(cursor.name.as_str());
            }
            match cursor.parent.and_then(|p| self.accounts.get(&p)) {
                Some(parent) => cursor = parent,
                None => break,
            }
        }
        segments.reverse();
        Some(segments.join(&ACCOUNT_SEPARATOR.to_string()))
    }

    fn is_reachable(&self, from: AccountId, id: AccountId) -> bool {
        if !self.accounts.contains_key(&from) {
            return false;
        }
        let mut cursor = self.accounts.get(&id);
        while let Some(node) = cursor {
            if node.id == from {
                return true;
            }
            cursor = node.parent.and_then(|p| self.accounts.get(&p));
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_account_creates_missing_segments() {
        let mut tree = AccountTree::new();
        let food = tree
            .find_account("Expenses:Food", true)
            .expect("auto-created");

        assert_eq!(tree.len(), 2);
        assert_eq!(tree.full_name(food).as_deref(), Some("Expenses:Food"));
        assert_eq!(tree.find_account("Expenses:Food", false), Some(food));
    }

    #[test]
    fn find_account_without_auto_create_reports_missing() {
        let mut tree = AccountTree::new();
        assert_eq!(tree.find_account("Assets:Cash", false), None);
        assert!(tree.is_empty());
    }

    #[test]
    fn find_account_rejects_empty_segments() {
        let mut tree = AccountTree::new();
        assert_eq!(tree.find_account("Assets::Cash", true), None);
    }

    #[test]
    fn pattern_lookup_walks_depth_first() {
        let mut tree = AccountTree::new();
        let checking = tree.find_account("Assets:Checking", true).unwrap();
        tree.find_account("Liabilities:Card", true).unwrap();

        let pattern = Regex::new("Check").unwrap();
        assert_eq!(tree.find_account_re(&pattern), Some(checking));
        let none = Regex::new("^Income").unwrap();
        assert_eq!(tree.find_account_re(&none), None);
    }

    #[test]
    fn add_account_reuses_sibling_with_same_name() {
        let mut tree = AccountTree::new();
        let first = tree.add_account(Account::new("Assets"));
        let second = tree.add_account(Account::new("Assets"));
        assert_eq!(first, second);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn remove_account_drops_subtree() {
        let mut tree = AccountTree::new();
        let assets = tree.add_account(Account::new("Assets"));
        let cash = tree.add_account(Account::child_of(assets, "Cash"));

        assert!(tree.remove_account(assets));
        assert!(!tree.contains(cash));
        assert!(tree.is_empty());
        assert!(!tree.remove_account(assets));
        assert!(!tree.remove_account(tree.root()));
    }

    #[test]
    fn reachability_follows_parent_chain() {
        let mut tree = AccountTree::new();
        let assets = tree.find_account("Assets", true).unwrap();
        let cash = tree.find_account("Assets:Cash", true).unwrap();
        let income = tree.find_account("Income", true).unwrap();

        assert!(tree.is_reachable(tree.root(), cash));
        assert!(tree.is_reachable(assets, cash));
        assert!(!tree.is_reachable(income, cash));
        assert!(!tree.is_reachable(assets, AccountId::new()));
    }
}
