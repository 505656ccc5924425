// Example: optimistic add/remove with out-of-order server answers.
use lazylist::{ConflictPolicy, Message, Mutation, OptimisticStore};

#[derive(Clone, Debug)]
struct Todo {
    id: String,
    title: String,
}

fn todo(id: &str, title: &str) -> Todo {
    Todo {
        id: id.to_string(),
        title: title.to_string(),
    }
}

fn main() {
    let mut store = OptimisticStore::new(|t: &Todo| t.id.clone(), ConflictPolicy::SubmissionOrder);
    store.append_confirmed([todo("1", "milk"), todo("2", "eggs")]);

    let add = store.mutate(Mutation::Add(todo("tmp-1", "bread")));
    let remove = store.mutate(Mutation::Remove("1".to_string()));
    println!("optimistic view: {:?}", store.view());

    // The removal is rejected first; the add commits with its server key afterwards.
    let rejected = store.resolve(remove.id, Err(Message::new("forbidden")));
    println!("rollback: {:?}", rejected.error().map(ToString::to_string));
    let committed = store.resolve(add.id, Ok::<_, Message>(todo("42", "bread")));
    println!("commit: {committed:?}");

    for t in store.view() {
        println!("{} {}", t.id, t.title);
    }
}
