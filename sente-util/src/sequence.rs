use std::cmp::Ordering;

use rand::Rng;

/// Similar to [rand::seq::IteratorRandom::choose] but only picks items with the maximum key.
/// Equivalent to finding the max key, filtering items matching it and choosing a random element,
/// but implemented in a single pass over the iterator.
pub fn choose_max_by_key<T, I: IntoIterator<Item = T>, K: Ord, F: FnMut(&T) -> K>(
    iter: I,
    mut key: F,
    rng: &mut impl Rng,
) -> Option<T> {
    let mut iter = iter.into_iter();

    let mut curr = iter.next()?;
    let mut max_key = key(&curr);
    let mut i = 1;

    for next in iter {
        let next_key = key(&next);
        match next_key.cmp(&max_key) {
            Ordering::Less => continue,
            Ordering::Equal => {
                i += 1;
                if rng.gen_range(0..i) == 0 {
                    curr = next;
                }
            }
            Ordering::Greater => {
                i = 1;
                curr = next;
                max_key = next_key;
            }
        }
    }

    Some(curr)
}

#[cfg(test)]
mod test {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::sequence::choose_max_by_key;

    #[test]
    fn choose_max_singleton() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(choose_max_by_key([3], |&x| x, &mut rng), Some(3));
    }

    #[test]
    fn choose_max_unique() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(choose_max_by_key([1, 5, 2], |&x| x, &mut rng), Some(5));
    }

    #[test]
    fn choose_max_ties_stay_maximal() {
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..32 {
            let picked = choose_max_by_key([(0, 4), (1, 4), (2, 1)], |&(_, k)| k, &mut rng).unwrap();
            assert_eq!(picked.1, 4);
        }
    }
}
