use {
    arbor::{Forest, MpTree, Position},
    cosmwasm_std::{testing::MockStorage, Storage},
    serde::{Deserialize, Serialize},
};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
struct Page {
    title: String,
}

const SITE: Forest<MpTree<Page>> = Forest::new(MpTree::new("r", "p", "s"));

fn page(title: &str) -> Page {
    Page {
        title: title.into(),
    }
}

fn main() {
    let mut store = MockStorage::new();

    let home = SITE.add_root(&mut store, page("home")).unwrap();
    let docs = SITE.add_child(&mut store, home.id, page("docs")).unwrap();
    let blog = SITE.add_child(&mut store, home.id, page("blog")).unwrap();
    SITE.add_child(&mut store, docs.id, page("install")).unwrap();
    SITE.add_child(&mut store, docs.id, page("api")).unwrap();
    let mut faq = SITE.add_child(&mut store, blog.id, page("faq")).unwrap();

    println!("SITE MAP:");
    println!("------------------------------------------------------------------");
    print_tree(&store);

    // the faq belongs under docs, before the api reference
    let api = SITE.get_last_child(&store, docs.id).unwrap().unwrap();
    SITE.move_node(&mut store, &mut faq, api.id, Position::Left).unwrap();

    println!("\nAFTER MOVING THE FAQ:");
    println!("------------------------------------------------------------------");
    print_tree(&store);

    let removed = SITE.delete(&mut store, blog.id).unwrap();
    println!("\nAFTER DELETING THE BLOG ({removed} rows):");
    println!("------------------------------------------------------------------");
    print_tree(&store);

    println!("\nBULK DUMP:");
    println!("------------------------------------------------------------------");
    let dump = SITE.dump_bulk(&store, None, true).unwrap();
    println!("{}", serde_json::to_string_pretty(&dump).unwrap());

    let problems = SITE.find_problems(&store).unwrap();
    println!("\nproblems found: {}", if problems.is_empty() { "none" } else { "?!" });
}

fn print_tree(store: &dyn Storage) {
    for (node, info) in SITE.get_annotated_list(store, None).unwrap() {
        println!("{}{}", "    ".repeat(info.level as usize), node.data.title);
    }
}
