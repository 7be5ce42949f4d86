use proptest::prelude::*;
use std::collections::HashMap;
use votum_core::backend::{LocalBackend, VotingBackend};
use votum_core::repository::MeasureRepository;
use votum_core::schema::{Tally, User, VoteChoice};
use votum_core::store::LocalStore;

const USERS: [&str; 4] = ["user-a", "user-b", "user-c", "user-d"];
const MEASURES: [&str; 2] = ["fresh-1", "fresh-2"];

fn choice() -> impl Strategy<Value = VoteChoice> {
    prop_oneof![
        Just(VoteChoice::For),
        Just(VoteChoice::Against),
        Just(VoteChoice::Abstain),
    ]
}

fn cast() -> impl Strategy<Value = (usize, usize, VoteChoice)> {
    (0..MEASURES.len(), 0..USERS.len(), choice())
}

fn backend() -> LocalBackend {
    let backend = LocalBackend::new(MeasureRepository::new(LocalStore::in_memory()));
    let template = backend.repository().get_by_id("seed-1").unwrap();
    for id in MEASURES {
        let mut measure = template.clone();
        measure.id = id.to_string();
        measure.totals = Tally::default();
        backend.repository().upsert(measure).unwrap();
    }
    backend
}

proptest! {
    #[test]
    fn one_vote_per_user_and_tally_matches(casts in prop::collection::vec(cast(), 0..40)) {
        let backend = backend();
        let mut last: HashMap<(usize, usize), VoteChoice> = HashMap::new();

        for (measure, voter, choice) in casts {
            let user = User {
                id: USERS[voter].to_string(),
                display_name: USERS[voter].to_string(),
            };
            backend.cast_vote(MEASURES[measure], choice, &user).unwrap();
            last.insert((measure, voter), choice);
        }

        for (m, id) in MEASURES.iter().enumerate() {
            let votes = backend.ledger().votes_for_measure(id);
            let voters = last.keys().filter(|(measure, _)| *measure == m).count();
            prop_assert_eq!(votes.len(), voters);

            let mut expected = Tally::default();
            for ((measure, _), choice) in &last {
                if *measure == m {
                    expected.increment(*choice);
                }
            }
            let tally = backend.get_measure(id).unwrap().unwrap().totals;
            prop_assert_eq!(tally, expected);

            for vote in votes {
                let voter = USERS.iter().position(|u| *u == vote.user_id).unwrap();
                prop_assert_eq!(Some(&vote.choice), last.get(&(m, voter)));
            }
        }
    }
}
