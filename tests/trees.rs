//! The shared tree-behavior suite: every scenario runs against all four
//! encodings through the same node protocol, and must observe exactly the
//! same forest.

use {
    arbor::{
        AlTree, BulkNode, Error, Forest, LtTree, MpTree, NsTree, OrderKey, OrderToken, Position,
        TreeEngine,
    },
    cosmwasm_std::testing::MockStorage,
    serde::{Deserialize, Serialize},
};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
struct Doc {
    desc: String,
}

fn doc(desc: &str) -> Doc {
    Doc {
        desc: desc.into(),
    }
}

const MP: Forest<MpTree<Doc>> = Forest::new(MpTree::new("mp_r", "mp_p", "mp_s"));
const NS: Forest<NsTree<Doc>> = Forest::new(NsTree::new("ns_r", "ns_p", "ns_s"));
const AL: Forest<AlTree<Doc>> = Forest::new(AlTree::new("al_r", "al_p", "al_s"));
const LT: Forest<LtTree<Doc>> = Forest::new(LtTree::new("lt_r", "lt_p", "lt_s"));

/// The ten-node fixture: four roots, `2` with four children, `23` and `4`
/// with one child each.
fn base_data() -> Vec<BulkNode<Doc>> {
    let node = |desc: &str, children: Vec<BulkNode<Doc>>| BulkNode::with_children(doc(desc), children);
    vec![
        node("1", vec![]),
        node("2", vec![
            node("21", vec![]),
            node("22", vec![]),
            node("23", vec![node("231", vec![])]),
            node("24", vec![]),
        ]),
        node("3", vec![]),
        node("4", vec![node("41", vec![])]),
    ]
}

fn unchanged() -> Vec<(String, u32, u64)> {
    shape(&[
        ("1", 1, 0),
        ("2", 1, 4),
        ("21", 2, 0),
        ("22", 2, 0),
        ("23", 2, 1),
        ("231", 3, 0),
        ("24", 2, 0),
        ("3", 1, 0),
        ("4", 1, 1),
        ("41", 2, 0),
    ])
}

fn shape(expected: &[(&str, u32, u64)]) -> Vec<(String, u32, u64)> {
    expected
        .iter()
        .map(|&(desc, depth, children)| (desc.to_string(), depth, children))
        .collect()
}

fn build<E: TreeEngine<Data = Doc>>(forest: &Forest<E>, store: &mut MockStorage) {
    forest.load_bulk(store, &base_data(), None, false).unwrap();
}

/// The whole forest as `(desc, depth, children_count)` in tree order.
fn got<E: TreeEngine<Data = Doc>>(forest: &Forest<E>, store: &MockStorage) -> Vec<(String, u32, u64)> {
    forest
        .get_tree(store, None)
        .unwrap()
        .into_iter()
        .map(|node| {
            (
                node.data.desc.clone(),
                forest.get_depth(store, node.id).unwrap(),
                forest.get_children_count(store, node.id).unwrap(),
            )
        })
        .collect()
}

fn find<E: TreeEngine<Data = Doc>>(forest: &Forest<E>, store: &MockStorage, desc: &str) -> u64 {
    forest
        .get_tree(store, None)
        .unwrap()
        .into_iter()
        .find(|node| node.data.desc == desc)
        .unwrap_or_else(|| panic!("no node with desc {desc:?}"))
        .id
}

fn assert_healthy<E: TreeEngine<Data = Doc>>(forest: &Forest<E>, store: &MockStorage) {
    let problems = forest.find_problems(store).unwrap();
    assert!(problems.is_empty(), "diagnostics found problems: {problems:?}");
}

// ------------------------------------------------------------------ scenarios

fn empty_forest<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let store = MockStorage::new();
    assert_eq!(got(forest, &store), vec![]);
    assert_eq!(forest.dump_bulk(&store, None, true).unwrap(), vec![]);
    assert!(forest.get_first_root_node(&store).unwrap().is_none());
    assert!(forest.get_last_root_node(&store).unwrap().is_none());
    assert!(forest.get_annotated_list(&store, None).unwrap().is_empty());
    assert_healthy(forest, &store);
}

fn load_bulk_unchanged<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    let added = forest.load_bulk(&mut store, &base_data(), None, false).unwrap();
    assert_eq!(added.len(), 10);
    assert_eq!(got(forest, &store), unchanged());
    assert_healthy(forest, &store);
}

fn dump_bulk_mirrors_input<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);
    assert_eq!(forest.dump_bulk(&store, None, false).unwrap(), base_data());
}

fn dump_load_round_trip<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    let dump = forest.dump_bulk(&store, None, true).unwrap();
    let roots = forest
        .get_root_nodes(&store)
        .unwrap()
        .into_iter()
        .map(|node| node.id)
        .collect::<Vec<_>>();
    forest.delete_many(&mut store, &roots).unwrap();
    assert_eq!(got(forest, &store), vec![]);

    forest.load_bulk(&mut store, &dump, None, true).unwrap();
    assert_eq!(forest.dump_bulk(&store, None, true).unwrap(), dump);
    assert_eq!(got(forest, &store), unchanged());
    assert_healthy(forest, &store);
}

fn load_bulk_into_node<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    let at = find(forest, &store, "231");
    forest.load_bulk(&mut store, &base_data(), Some(at), false).unwrap();
    assert_eq!(got(forest, &store), shape(&[
        ("1", 1, 0),
        ("2", 1, 4),
        ("21", 2, 0),
        ("22", 2, 0),
        ("23", 2, 1),
        ("231", 3, 4),
        ("1", 4, 0),
        ("2", 4, 4),
        ("21", 5, 0),
        ("22", 5, 0),
        ("23", 5, 1),
        ("231", 6, 0),
        ("24", 5, 0),
        ("3", 4, 0),
        ("4", 4, 1),
        ("41", 5, 0),
        ("24", 2, 0),
        ("3", 1, 0),
        ("4", 1, 1),
        ("41", 2, 0),
    ]));

    // and the branch dumps back as a nested copy of the fixture
    assert_eq!(
        forest.dump_bulk(&store, Some(at), false).unwrap(),
        vec![BulkNode::with_children(doc("231"), base_data())],
    );
    assert_healthy(forest, &store);
}

fn add_child_to_leaf<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    let at = find(forest, &store, "231");
    forest.add_child(&mut store, at, doc("2311")).unwrap();
    assert_eq!(got(forest, &store), shape(&[
        ("1", 1, 0),
        ("2", 1, 4),
        ("21", 2, 0),
        ("22", 2, 0),
        ("23", 2, 1),
        ("231", 3, 1),
        ("2311", 4, 0),
        ("24", 2, 0),
        ("3", 1, 0),
        ("4", 1, 1),
        ("41", 2, 0),
    ]));
    assert_healthy(forest, &store);
}

fn add_siblings_everywhere<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    let at = find(forest, &store, "22");
    forest.add_sibling(&mut store, at, Position::Left, doc("before22")).unwrap();
    forest.add_sibling(&mut store, at, Position::Right, doc("after22")).unwrap();
    forest.add_sibling(&mut store, at, Position::FirstSibling, doc("first")).unwrap();
    forest.add_sibling(&mut store, at, Position::LastSibling, doc("last")).unwrap();
    assert_eq!(got(forest, &store), shape(&[
        ("1", 1, 0),
        ("2", 1, 8),
        ("first", 2, 0),
        ("21", 2, 0),
        ("before22", 2, 0),
        ("22", 2, 0),
        ("after22", 2, 0),
        ("23", 2, 1),
        ("231", 3, 0),
        ("24", 2, 0),
        ("last", 2, 0),
        ("3", 1, 0),
        ("4", 1, 1),
        ("41", 2, 0),
    ]));
    assert_healthy(forest, &store);
}

fn add_root_sibling<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    let at = find(forest, &store, "3");
    forest.add_sibling(&mut store, at, Position::Left, doc("2.5")).unwrap();
    forest.add_sibling(&mut store, at, Position::FirstSibling, doc("0")).unwrap();
    assert_eq!(got(forest, &store), shape(&[
        ("0", 1, 0),
        ("1", 1, 0),
        ("2", 1, 4),
        ("21", 2, 0),
        ("22", 2, 0),
        ("23", 2, 1),
        ("231", 3, 0),
        ("24", 2, 0),
        ("2.5", 1, 0),
        ("3", 1, 0),
        ("4", 1, 1),
        ("41", 2, 0),
    ]));
    assert_healthy(forest, &store);
}

fn move_leaf_left<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    let mut node = forest.get(&store, find(forest, &store, "231")).unwrap();
    let target = find(forest, &store, "22");
    forest.move_node(&mut store, &mut node, target, Position::Left).unwrap();
    assert_eq!(got(forest, &store), shape(&[
        ("1", 1, 0),
        ("2", 1, 5),
        ("21", 2, 0),
        ("231", 2, 0),
        ("22", 2, 0),
        ("23", 2, 0),
        ("24", 2, 0),
        ("3", 1, 0),
        ("4", 1, 1),
        ("41", 2, 0),
    ]));
    assert_healthy(forest, &store);
}

fn move_branch_first_child<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    let mut node = forest.get(&store, find(forest, &store, "4")).unwrap();
    let target = find(forest, &store, "2");
    forest.move_node(&mut store, &mut node, target, Position::FirstChild).unwrap();
    assert_eq!(got(forest, &store), shape(&[
        ("1", 1, 0),
        ("2", 1, 5),
        ("4", 2, 1),
        ("41", 3, 0),
        ("21", 2, 0),
        ("22", 2, 0),
        ("23", 2, 1),
        ("231", 3, 0),
        ("24", 2, 0),
        ("3", 1, 0),
    ]));
    assert_healthy(forest, &store);
}

fn move_branch_into_leaf<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    let mut node = forest.get(&store, find(forest, &store, "2")).unwrap();
    let target = find(forest, &store, "3");
    forest.move_node(&mut store, &mut node, target, Position::LastChild).unwrap();
    assert_eq!(got(forest, &store), shape(&[
        ("1", 1, 0),
        ("3", 1, 1),
        ("2", 2, 4),
        ("21", 3, 0),
        ("22", 3, 0),
        ("23", 3, 1),
        ("231", 4, 0),
        ("24", 3, 0),
        ("4", 1, 1),
        ("41", 2, 0),
    ]));
    assert_healthy(forest, &store);
}

fn move_branch_to_root_level<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    let mut node = forest.get(&store, find(forest, &store, "23")).unwrap();
    let target = find(forest, &store, "1");
    forest.move_node(&mut store, &mut node, target, Position::Right).unwrap();
    assert_eq!(got(forest, &store), shape(&[
        ("1", 1, 0),
        ("23", 1, 1),
        ("231", 2, 0),
        ("2", 1, 3),
        ("21", 2, 0),
        ("22", 2, 0),
        ("24", 2, 0),
        ("3", 1, 0),
        ("4", 1, 1),
        ("41", 2, 0),
    ]));
    assert_healthy(forest, &store);
}

fn move_preserves_subtree<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    let id = find(forest, &store, "2");
    let before = forest
        .get_descendants(&store, id, false)
        .unwrap()
        .into_iter()
        .map(|node| node.id)
        .collect::<Vec<_>>();

    let mut node = forest.get(&store, id).unwrap();
    let target = find(forest, &store, "41");
    forest.move_node(&mut store, &mut node, target, Position::LastChild).unwrap();

    let after = forest
        .get_descendants(&store, id, false)
        .unwrap()
        .into_iter()
        .map(|node| node.id)
        .collect::<Vec<_>>();
    assert_eq!(before, after);
    assert_healthy(forest, &store);
}

fn move_noops<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    for pos in [Position::Left, Position::Right] {
        let id = find(forest, &store, "22");
        let mut node = forest.get(&store, id).unwrap();
        forest.move_node(&mut store, &mut node, id, pos).unwrap();
        assert_eq!(got(forest, &store), unchanged());
    }
    assert_healthy(forest, &store);
}

fn move_rejects_descendants<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    let id = find(forest, &store, "2");
    let below = find(forest, &store, "231");

    let mut node = forest.get(&store, id).unwrap();
    let err = forest
        .move_node(&mut store, &mut node, below, Position::FirstChild)
        .unwrap_err();
    assert_eq!(err, Error::InvalidMoveToDescendant);

    let mut node = forest.get(&store, id).unwrap();
    let err = forest
        .move_node(&mut store, &mut node, below, Position::Left)
        .unwrap_err();
    assert_eq!(err, Error::InvalidMoveToDescendant);

    let mut node = forest.get(&store, id).unwrap();
    let err = forest
        .move_node(&mut store, &mut node, id, Position::LastChild)
        .unwrap_err();
    assert_eq!(err, Error::InvalidMoveToDescendant);

    // nothing was touched along the way
    assert_eq!(got(forest, &store), unchanged());
}

fn delete_root_with_descendants<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    let id = find(forest, &store, "2");
    let removed = forest.delete(&mut store, id).unwrap();
    assert_eq!(removed, 6);
    assert_eq!(got(forest, &store), shape(&[
        ("1", 1, 0),
        ("3", 1, 0),
        ("4", 1, 1),
        ("41", 2, 0),
    ]));
    assert_healthy(forest, &store);
}

fn delete_leaf<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    let id = find(forest, &store, "231");
    let removed = forest.delete(&mut store, id).unwrap();
    assert_eq!(removed, 1);
    assert_eq!(got(forest, &store), shape(&[
        ("1", 1, 0),
        ("2", 1, 4),
        ("21", 2, 0),
        ("22", 2, 0),
        ("23", 2, 0),
        ("24", 2, 0),
        ("3", 1, 0),
        ("4", 1, 1),
        ("41", 2, 0),
    ]));
    assert_healthy(forest, &store);
}

fn delete_many_overlapping<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    // 23 and 231 are covered by 2; the set must reduce before deleting
    let doomed = vec![
        find(forest, &store, "23"),
        find(forest, &store, "2"),
        find(forest, &store, "231"),
        find(forest, &store, "41"),
    ];
    let removed = forest.delete_many(&mut store, &doomed).unwrap();
    assert_eq!(removed, 7);
    assert_eq!(got(forest, &store), shape(&[
        ("1", 1, 0),
        ("3", 1, 0),
        ("4", 1, 0),
    ]));
    assert_healthy(forest, &store);
}

fn navigation<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    let descs = |nodes: Vec<arbor::Node<Doc>>| {
        nodes.into_iter().map(|n| n.data.desc).collect::<Vec<_>>()
    };

    let at = find(forest, &store, "231");
    assert_eq!(forest.get_depth(&store, at).unwrap(), 3);
    assert_eq!(forest.get_root(&store, at).unwrap().data.desc, "2");
    assert_eq!(descs(forest.get_ancestors(&store, at).unwrap()), ["2", "23"]);

    let at = find(forest, &store, "2");
    assert_eq!(descs(forest.get_children(&store, at).unwrap()), ["21", "22", "23", "24"]);
    assert_eq!(forest.get_first_child(&store, at).unwrap().unwrap().data.desc, "21");
    assert_eq!(forest.get_last_child(&store, at).unwrap().unwrap().data.desc, "24");
    assert_eq!(
        descs(forest.get_descendants(&store, at, false).unwrap()),
        ["21", "22", "23", "231", "24"],
    );
    assert_eq!(
        descs(forest.get_descendants(&store, at, true).unwrap()),
        ["2", "21", "22", "23", "231", "24"],
    );
    assert_eq!(forest.get_descendant_count(&store, at).unwrap(), 5);

    let at = find(forest, &store, "22");
    assert_eq!(descs(forest.get_siblings(&store, at).unwrap()), ["21", "22", "23", "24"]);
    assert_eq!(forest.get_first_sibling(&store, at).unwrap().data.desc, "21");
    assert_eq!(forest.get_last_sibling(&store, at).unwrap().data.desc, "24");
    assert_eq!(forest.get_prev_sibling(&store, at).unwrap().unwrap().data.desc, "21");
    assert_eq!(forest.get_next_sibling(&store, at).unwrap().unwrap().data.desc, "23");

    let first = find(forest, &store, "21");
    let last = find(forest, &store, "24");
    assert!(forest.get_prev_sibling(&store, first).unwrap().is_none());
    assert!(forest.get_next_sibling(&store, last).unwrap().is_none());

    // roots are one sibling group
    let at = find(forest, &store, "3");
    assert_eq!(descs(forest.get_siblings(&store, at).unwrap()), ["1", "2", "3", "4"]);
    assert_eq!(descs(forest.get_root_nodes(&store).unwrap()), ["1", "2", "3", "4"]);
    assert_eq!(forest.get_first_root_node(&store).unwrap().unwrap().data.desc, "1");
    assert_eq!(forest.get_last_root_node(&store).unwrap().unwrap().data.desc, "4");
}

fn parent_cache<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    let mut node = forest.get(&store, find(forest, &store, "41")).unwrap();
    let parent = forest.get_parent(&store, &mut node, false).unwrap().unwrap();
    assert_eq!(parent.data.desc, "4");

    // served from the cache slot, and again after an explicit refresh
    let cached = forest.get_parent(&store, &mut node, false).unwrap().unwrap();
    assert_eq!(cached.id, parent.id);
    let fresh = forest.get_parent(&store, &mut node, true).unwrap().unwrap();
    assert_eq!(fresh.id, parent.id);

    // the cache does not survive a move
    let target = find(forest, &store, "1");
    forest.move_node(&mut store, &mut node, target, Position::LastChild).unwrap();
    let parent = forest.get_parent(&store, &mut node, false).unwrap().unwrap();
    assert_eq!(parent.data.desc, "1");

    let mut root = forest.get(&store, find(forest, &store, "2")).unwrap();
    assert!(forest.get_parent(&store, &mut root, false).unwrap().is_none());
}

fn predicates<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    let two = find(forest, &store, "2");
    let n23 = find(forest, &store, "23");
    let n231 = find(forest, &store, "231");
    let n21 = find(forest, &store, "21");
    let four = find(forest, &store, "4");

    assert!(forest.is_root(&store, two).unwrap());
    assert!(!forest.is_root(&store, n23).unwrap());
    assert!(forest.is_leaf(&store, n231).unwrap());
    assert!(!forest.is_leaf(&store, n23).unwrap());

    assert!(forest.is_child_of(&store, n23, two).unwrap());
    assert!(!forest.is_child_of(&store, n231, two).unwrap());
    assert!(forest.is_sibling_of(&store, n21, n23).unwrap());
    assert!(forest.is_sibling_of(&store, two, four).unwrap());
    assert!(!forest.is_sibling_of(&store, n21, n231).unwrap());

    assert!(forest.is_descendant_of(&store, n231, two).unwrap());
    assert!(forest.is_descendant_of(&store, n231, n23).unwrap());
    assert!(!forest.is_descendant_of(&store, n231, four).unwrap());
    assert!(!forest.is_descendant_of(&store, two, n231).unwrap());
    assert!(!forest.is_descendant_of(&store, two, two).unwrap());

    // descendant/ancestor duality over the whole fixture
    let all = forest.get_tree(&store, None).unwrap();
    for node in &all {
        let descendants = forest.get_descendants(&store, node.id, false).unwrap();
        for other in &all {
            let is_down = descendants.iter().any(|d| d.id == other.id);
            let is_up = forest
                .get_ancestors(&store, other.id)
                .unwrap()
                .iter()
                .any(|a| a.id == node.id);
            assert_eq!(is_down, is_up);
        }
    }
}

fn annotated_list<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    let annotate = |parent: Option<u64>| {
        forest
            .get_annotated_list(&store, parent)
            .unwrap()
            .into_iter()
            .map(|(node, info)| (node.data.desc, info.open, info.close, info.level))
            .collect::<Vec<_>>()
    };
    let row = |desc: &str, open: bool, close: &[u32], level: u32| {
        (desc.to_string(), open, close.to_vec(), level)
    };

    assert_eq!(annotate(None), vec![
        row("1", true, &[], 0),
        row("2", false, &[], 0),
        row("21", true, &[], 1),
        row("22", false, &[], 1),
        row("23", false, &[], 1),
        row("231", true, &[0], 2),
        row("24", false, &[0], 1),
        row("3", false, &[], 0),
        row("4", false, &[], 0),
        row("41", true, &[0, 1], 1),
    ]);

    assert_eq!(annotate(Some(find(forest, &store, "2"))), vec![
        row("2", true, &[], 0),
        row("21", true, &[], 1),
        row("22", false, &[], 1),
        row("23", false, &[], 1),
        row("231", true, &[0], 2),
        row("24", false, &[0, 1], 1),
    ]);

    assert_eq!(annotate(Some(find(forest, &store, "1"))), vec![
        row("1", true, &[0], 0),
    ]);
}

fn descendants_group_count<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    let counts = |parent: Option<u64>| {
        forest
            .get_descendants_group_count(&store, parent)
            .unwrap()
            .into_iter()
            .map(|(node, count)| (node.data.desc, count))
            .collect::<Vec<_>>()
    };

    assert_eq!(counts(None), vec![
        ("1".to_string(), 0),
        ("2".to_string(), 5),
        ("3".to_string(), 0),
        ("4".to_string(), 1),
    ]);
    assert_eq!(counts(Some(find(forest, &store, "2"))), vec![
        ("21".to_string(), 0),
        ("22".to_string(), 0),
        ("23".to_string(), 1),
        ("24".to_string(), 0),
    ]);
}

fn subtree_walk<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    let descs = |parent: Option<u64>| {
        forest
            .get_tree(&store, parent)
            .unwrap()
            .into_iter()
            .map(|node| node.data.desc)
            .collect::<Vec<_>>()
    };

    assert_eq!(descs(Some(find(forest, &store, "2"))), ["2", "21", "22", "23", "231", "24"]);
    assert_eq!(descs(Some(find(forest, &store, "1"))), ["1"]);
}

fn position_vocabulary<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);
    let at = find(forest, &store, "22");

    // child positions make no sense for add_sibling
    let err = forest
        .add_sibling(&mut store, at, Position::FirstChild, doc("x"))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPosition { .. }));

    // sorted positions need an ordering directive
    let err = forest
        .add_sibling(&mut store, at, Position::SortedSibling, doc("x"))
        .unwrap_err();
    assert_eq!(err, Error::MissingNodeOrderBy);

    let mut node = forest.get(&store, at).unwrap();
    let target = find(forest, &store, "3");
    let err = forest
        .move_node(&mut store, &mut node, target, Position::SortedChild)
        .unwrap_err();
    assert_eq!(err, Error::MissingNodeOrderBy);

    assert_eq!(got(forest, &store), unchanged());
}

fn bulk_keep_ids_errors<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    let taken = find(forest, &store, "1");
    let mut clash = BulkNode::new(doc("again"));
    clash.id = Some(taken);
    let err = forest.load_bulk(&mut store, &[clash], None, true).unwrap_err();
    assert_eq!(err, Error::NodeAlreadySaved { id: taken });

    let err = forest
        .load_bulk(&mut store, &[BulkNode::new(doc("anon"))], None, true)
        .unwrap_err();
    assert_eq!(err, Error::MissingBulkId);
}

fn fix_tree_destructive<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    // shake the tree a little so the bookkeeping has holes to compact
    let mut node = forest.get(&store, find(forest, &store, "23")).unwrap();
    let target = find(forest, &store, "41");
    forest.move_node(&mut store, &mut node, target, Position::LastChild).unwrap();
    let id = find(forest, &store, "22");
    forest.delete(&mut store, id).unwrap();

    let before = forest.dump_bulk(&store, None, true).unwrap();
    forest.fix_tree(&mut store, true).unwrap();
    assert_eq!(forest.dump_bulk(&store, None, true).unwrap(), before);
    assert_healthy(forest, &store);

    forest.fix_tree(&mut store, false).unwrap();
    assert_eq!(forest.dump_bulk(&store, None, true).unwrap(), before);
    assert_healthy(forest, &store);
}

fn mutation_storm_stays_consistent<E: TreeEngine<Data = Doc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    build(forest, &mut store);

    let mut node = forest.get(&store, find(forest, &store, "4")).unwrap();
    let target = find(forest, &store, "21");
    forest.move_node(&mut store, &mut node, target, Position::LastChild).unwrap();
    assert_healthy(forest, &store);

    let id = find(forest, &store, "41");
    forest.add_sibling(&mut store, id, Position::Left, doc("40")).unwrap();
    assert_healthy(forest, &store);

    let id = find(forest, &store, "23");
    forest.delete(&mut store, id).unwrap();
    assert_healthy(forest, &store);

    let mut node = forest.get(&store, find(forest, &store, "21")).unwrap();
    let target = find(forest, &store, "3");
    forest.move_node(&mut store, &mut node, target, Position::Left).unwrap();
    assert_healthy(forest, &store);

    assert_eq!(got(forest, &store), shape(&[
        ("1", 1, 0),
        ("2", 1, 2),
        ("22", 2, 0),
        ("24", 2, 0),
        ("21", 1, 1),
        ("4", 2, 2),
        ("40", 3, 0),
        ("41", 3, 0),
        ("3", 1, 0),
    ]));
}

macro_rules! all_engines {
    ($($scenario:ident),* $(,)?) => {
        mod mp {
            $(#[test] fn $scenario() { super::$scenario(&super::MP); })*
        }
        mod ns {
            $(#[test] fn $scenario() { super::$scenario(&super::NS); })*
        }
        mod al {
            $(#[test] fn $scenario() { super::$scenario(&super::AL); })*
        }
        mod lt {
            $(#[test] fn $scenario() { super::$scenario(&super::LT); })*
        }
    };
}

// ------------------------------------------------- mp-specific error paths

#[test]
fn mp_rejects_unordered_alphabets() {
    // unique symbols, but string order disagrees with numeric order; the
    // engine must refuse to run, not just the converter
    const BAD: Forest<MpTree<Doc>> =
        Forest::new(MpTree::new("bad_r", "bad_p", "bad_s").with_alphabet("ZYXA"));

    let mut store = MockStorage::new();
    let err = BAD.add_root(&mut store, doc("1")).unwrap_err();
    assert_eq!(err, Error::InvalidAlphabet);
}

#[test]
fn mp_respects_the_path_width_limit() {
    // two levels fit, the third does not
    const NARROW: Forest<MpTree<Doc>> =
        Forest::new(MpTree::new("nw_r", "nw_p", "nw_s").with_max_path_len(8));

    let mut store = MockStorage::new();
    let root = NARROW.add_root(&mut store, doc("1")).unwrap();
    let child = NARROW.add_child(&mut store, root.id, doc("11")).unwrap();
    let err = NARROW.add_child(&mut store, child.id, doc("111")).unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded { .. }));

    // a saturated step refuses to widen as well
    const TINY: Forest<MpTree<Doc>> =
        Forest::new(MpTree::new("tn_r", "tn_p", "tn_s").with_steplen(1).with_alphabet("01"));

    let mut store = MockStorage::new();
    TINY.add_root(&mut store, doc("1")).unwrap();
    let err = TINY.add_root(&mut store, doc("2")).unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded { .. }));
}

all_engines! {
    empty_forest,
    load_bulk_unchanged,
    dump_bulk_mirrors_input,
    dump_load_round_trip,
    load_bulk_into_node,
    add_child_to_leaf,
    add_siblings_everywhere,
    add_root_sibling,
    move_leaf_left,
    move_branch_first_child,
    move_branch_into_leaf,
    move_branch_to_root_level,
    move_preserves_subtree,
    move_noops,
    move_rejects_descendants,
    delete_root_with_descendants,
    delete_leaf,
    delete_many_overlapping,
    navigation,
    parent_cache,
    predicates,
    annotated_list,
    descendants_group_count,
    subtree_walk,
    position_vocabulary,
    bulk_keep_ids_errors,
    fix_tree_destructive,
    mutation_storm_stays_consistent,
}

// ------------------------------------------------------------- sorted trees

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
struct SortedDoc {
    val1: i64,
    val2: i64,
    desc: String,
}

fn sorted_doc(val1: i64, val2: i64, desc: &str) -> SortedDoc {
    SortedDoc {
        val1,
        val2,
        desc: desc.into(),
    }
}

fn sorted_key(d: &SortedDoc) -> OrderKey {
    vec![
        OrderToken::Int(d.val1),
        OrderToken::Int(d.val2),
        OrderToken::Text(d.desc.clone()),
    ]
}

const MP_SORTED: Forest<MpTree<SortedDoc>> =
    Forest::new(MpTree::new("smp_r", "smp_p", "smp_s").ordered_by(sorted_key));
const NS_SORTED: Forest<NsTree<SortedDoc>> =
    Forest::new(NsTree::new("sns_r", "sns_p", "sns_s").ordered_by(sorted_key));
const AL_SORTED: Forest<AlTree<SortedDoc>> =
    Forest::new(AlTree::new("sal_r", "sal_p", "sal_s").ordered_by(sorted_key));
const LT_SORTED: Forest<LtTree<SortedDoc>> =
    Forest::new(LtTree::new("slt_r", "slt_p", "slt_s").ordered_by(sorted_key));

fn insertion_batch() -> Vec<SortedDoc> {
    vec![
        sorted_doc(3, 3, "zxy"),
        sorted_doc(1, 4, "bcd"),
        sorted_doc(2, 5, "zxy"),
        sorted_doc(3, 3, "abc"),
        sorted_doc(4, 1, "fgh"),
        sorted_doc(3, 3, "abc"),
        sorted_doc(2, 2, "qwe"),
        sorted_doc(3, 2, "vcx"),
    ]
}

fn expected_order() -> Vec<(i64, i64, String)> {
    vec![
        (1, 4, "bcd".into()),
        (2, 2, "qwe".into()),
        (2, 5, "zxy".into()),
        (3, 2, "vcx".into()),
        (3, 3, "abc".into()),
        (3, 3, "abc".into()),
        (3, 3, "zxy".into()),
        (4, 1, "fgh".into()),
    ]
}

fn sorted_roots<E: TreeEngine<Data = SortedDoc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    for data in insertion_batch() {
        forest.add_root(&mut store, data).unwrap();
    }
    let order = forest
        .get_root_nodes(&store)
        .unwrap()
        .into_iter()
        .map(|node| (node.data.val1, node.data.val2, node.data.desc))
        .collect::<Vec<_>>();
    assert_eq!(order, expected_order());
}

fn sorted_children<E: TreeEngine<Data = SortedDoc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    let root = forest.add_root(&mut store, sorted_doc(0, 0, "root")).unwrap();
    for data in insertion_batch() {
        forest.add_child(&mut store, root.id, data).unwrap();
    }
    let order = forest
        .get_children(&store, root.id)
        .unwrap()
        .into_iter()
        .map(|node| (node.data.val1, node.data.val2, node.data.desc))
        .collect::<Vec<_>>();
    assert_eq!(order, expected_order());
}

fn sorted_move<E: TreeEngine<Data = SortedDoc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    let root = forest.add_root(&mut store, sorted_doc(0, 0, "root")).unwrap();
    for data in insertion_batch() {
        forest.add_root(&mut store, data).unwrap();
    }

    // gather every other root under the first one; the directive decides
    // where each lands
    loop {
        let strays = forest
            .get_root_nodes(&store)
            .unwrap()
            .into_iter()
            .filter(|node| node.id != root.id)
            .collect::<Vec<_>>();
        let Some(mut stray) = strays.into_iter().next() else {
            break;
        };
        forest
            .move_node(&mut store, &mut stray, root.id, Position::SortedChild)
            .unwrap();
    }

    let order = forest
        .get_children(&store, root.id)
        .unwrap()
        .into_iter()
        .map(|node| (node.data.val1, node.data.val2, node.data.desc))
        .collect::<Vec<_>>();
    assert_eq!(order, expected_order());
}

fn sorted_rejects_explicit_positions<E: TreeEngine<Data = SortedDoc>>(forest: &Forest<E>) {
    let mut store = MockStorage::new();
    let root = forest.add_root(&mut store, sorted_doc(1, 1, "a")).unwrap();
    let err = forest
        .add_sibling(&mut store, root.id, Position::Left, sorted_doc(2, 2, "b"))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPosition { .. }));
}

macro_rules! all_sorted_engines {
    ($($scenario:ident),* $(,)?) => {
        mod mp_sorted {
            $(#[test] fn $scenario() { super::$scenario(&super::MP_SORTED); })*
        }
        mod ns_sorted {
            $(#[test] fn $scenario() { super::$scenario(&super::NS_SORTED); })*
        }
        mod al_sorted {
            $(#[test] fn $scenario() { super::$scenario(&super::AL_SORTED); })*
        }
        mod lt_sorted {
            $(#[test] fn $scenario() { super::$scenario(&super::LT_SORTED); })*
        }
    };
}

all_sorted_engines! {
    sorted_roots,
    sorted_children,
    sorted_move,
    sorted_rejects_explicit_positions,
}
