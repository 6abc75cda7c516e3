use std::fmt;

/// The four observations a cycle decides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Facts {
    /// The live read (or import) found the resource.
    pub exists: bool,
    /// A prior record with a known state is stored.
    pub state_known: bool,
    pub id_provided: bool,
    pub purged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Apply the desired config in place, unless nothing differs.
    Update,
    Delete,
    /// Adopt the imported resource, then update it.
    ImportThenUpdate,
    /// Create from scratch. Also taken when the resource exists but no state is tracked.
    Create,
    /// The stored state says it exists but it is gone: create it again.
    Repair,
    /// Import already came back empty, so create.
    ImportOrCreate,
    NoChange,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Update => "update",
            Action::Delete => "delete",
            Action::ImportThenUpdate => "import+update",
            Action::Create => "create",
            Action::Repair => "repair",
            Action::ImportOrCreate => "import-or-create",
            Action::NoChange => "no-change",
        };
        f.write_str(name)
    }
}

/// What the stored record should look like after a successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateClass {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decision {
    pub action: Action,
    pub resulting: StateClass,
}

const fn decision(action: Action, resulting: StateClass) -> Decision {
    Decision { action, resulting }
}

/// Maps the facts of a cycle to exactly one action.
///
/// Pure and total: every combination has one row.
pub fn decide(facts: Facts) -> Decision {
    use Action::*;
    use StateClass::*;

    let Facts {
        exists,
        state_known,
        id_provided,
        purged,
    } = facts;

    match (exists, state_known, id_provided, purged) {
        (true, true, _, false) => decision(Update, Updated),
        (true, true, _, true) => decision(Delete, Deleted),
        (true, false, true, false) => decision(ImportThenUpdate, Created),
        (true, false, true, true) => decision(Delete, Deleted),
        (true, false, false, false) => decision(Create, Created),
        (true, false, false, true) => decision(NoChange, Deleted),
        (false, true, _, false) => decision(Repair, Updated),
        (false, true, _, true) => decision(NoChange, Deleted),
        (false, false, true, false) => decision(ImportOrCreate, Created),
        (false, false, true, true) => decision(Delete, Deleted),
        (false, false, false, false) => decision(Create, Created),
        (false, false, false, true) => decision(NoChange, Deleted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(exists: bool, state_known: bool, id_provided: bool, purged: bool) -> Facts {
        Facts {
            exists,
            state_known,
            id_provided,
            purged,
        }
    }

    fn check(f: Facts, action: Action, resulting: StateClass) {
        assert_eq!(decide(f), Decision { action, resulting }, "facts {:?}", f);
    }

    #[test]
    fn test_exists_known_not_purged_updates() {
        check(facts(true, true, false, false), Action::Update, StateClass::Updated);
        check(facts(true, true, true, false), Action::Update, StateClass::Updated);
    }

    #[test]
    fn test_exists_known_purged_deletes() {
        check(facts(true, true, false, true), Action::Delete, StateClass::Deleted);
        check(facts(true, true, true, true), Action::Delete, StateClass::Deleted);
    }

    #[test]
    fn test_exists_unknown_with_id_imports() {
        check(facts(true, false, true, false), Action::ImportThenUpdate, StateClass::Created);
    }

    #[test]
    fn test_exists_unknown_with_id_purged_deletes() {
        check(facts(true, false, true, true), Action::Delete, StateClass::Deleted);
    }

    #[test]
    fn test_exists_unknown_without_id_recreates() {
        check(facts(true, false, false, false), Action::Create, StateClass::Created);
    }

    #[test]
    fn test_exists_unknown_without_id_purged_is_noop() {
        check(facts(true, false, false, true), Action::NoChange, StateClass::Deleted);
    }

    #[test]
    fn test_gone_but_known_repairs() {
        check(facts(false, true, true, false), Action::Repair, StateClass::Updated);
        check(facts(false, true, false, false), Action::Repair, StateClass::Updated);
    }

    #[test]
    fn test_gone_but_known_purged_is_noop() {
        check(facts(false, true, true, true), Action::NoChange, StateClass::Deleted);
        check(facts(false, true, false, true), Action::NoChange, StateClass::Deleted);
    }

    #[test]
    fn test_gone_unknown_with_id_falls_back_to_create() {
        check(facts(false, false, true, false), Action::ImportOrCreate, StateClass::Created);
    }

    #[test]
    fn test_gone_unknown_with_id_purged_deletes() {
        check(facts(false, false, true, true), Action::Delete, StateClass::Deleted);
    }

    #[test]
    fn test_nothing_known_creates() {
        check(facts(false, false, false, false), Action::Create, StateClass::Created);
    }

    #[test]
    fn test_nothing_known_purged_is_noop() {
        check(facts(false, false, false, true), Action::NoChange, StateClass::Deleted);
    }

    #[test]
    fn test_purge_never_creates() {
        for bits in 0..8u8 {
            let f = facts(bits & 1 != 0, bits & 2 != 0, bits & 4 != 0, true);
            let action = decide(f).action;
            assert!(
                matches!(action, Action::Delete | Action::NoChange),
                "purged facts {:?} chose {}",
                f,
                action
            );
            assert_eq!(decide(f).resulting, StateClass::Deleted);
        }
    }
}
