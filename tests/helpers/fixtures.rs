/// Common test fixtures and data structures
///
/// Defines reusable test models and seeded stores for use across multiple test files.
use super::{KeySchema, MemoryStore, Record, Serialize, to_record};

/// Table keyed by `id` alone
pub const USERS_TABLE: &str = "tests_users";

/// Table keyed by `game` and `age`
pub const OBJECTS_TABLE: &str = "tests_generic_objects";

/// Simple user with a partition key only
#[derive(Serialize, PartialEq, Debug, Clone)]
pub struct TestUser {
    pub id: String,
    pub name: String,
    pub team: String,
    pub created_at: String,
}

/// Simple test object with partition and sort key
#[derive(Serialize, PartialEq, Debug, Clone)]
pub struct TestObject {
    pub game: String,
    pub age: String,
    pub ux: String,
    pub number2: usize,
}

/// `count` users spread over three teams with one creation day each
pub fn test_users(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            let user = TestUser {
                id: format!("user-{i:04}"),
                name: format!("User {i}"),
                team: ["red", "green", "blue"][i % 3].to_string(),
                created_at: format!("2024-01-{:02}T00:00:00Z", i % 28 + 1),
            };
            to_record(&user).unwrap()
        })
        .collect()
}

/// Store with a users table holding `count` users
#[allow(dead_code)]
pub fn seeded_users(count: usize) -> MemoryStore {
    let store = MemoryStore::new().with_table(USERS_TABLE, KeySchema::partition("id"));
    store.insert(USERS_TABLE, test_users(count)).unwrap();
    store
}

/// Store with a composite-key table holding `games * per_game` objects
#[allow(dead_code)]
pub fn seeded_objects(games: usize, per_game: usize) -> MemoryStore {
    let store = MemoryStore::new().with_table(OBJECTS_TABLE, KeySchema::composite("game", "age"));
    let objects = (0..games).flat_map(|g| {
        (0..per_game).map(move |a| {
            to_record(&TestObject {
                game: format!("game-{g}"),
                age: format!("{a:03}"),
                ux: "item".to_string(),
                number2: a,
            })
            .unwrap()
        })
    });
    store.insert(OBJECTS_TABLE, objects).unwrap();
    store
}
