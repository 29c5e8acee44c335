use range_set_blaze::RangeSetBlaze;

/// Ordered, disjoint set of integer intervals over resource ids.
/// All resource identities and availability windows reduce to this type:
/// union is `|`, intersection `&`, subtraction `-`, equality `==`.
pub type RidSet = RangeSetBlaze<u32>;

pub trait RidSetOps {
    fn rid_count(&self) -> u32;
    fn claim_rids(&self, count: u32) -> Option<RidSet>;
    fn to_rids(&self) -> Vec<u32>;
    fn from_rids<I: IntoIterator<Item = u32>>(rids: I) -> RidSet;
}

impl RidSetOps for RidSet {
    #[inline]
    fn rid_count(&self) -> u32 {
        self.len() as u32
    }

    /// Tries to claim a subset of the set with exactly `count` ids,
    /// always taking the lowest ids first so that the same input yields the same subset.
    /// Returns `None` if fewer than `count` ids are available.
    fn claim_rids(&self, count: u32) -> Option<RidSet> {
        if self.rid_count() < count {
            return None;
        }
        let mut selected = RidSet::new();
        let mut remaining = count;
        for range in self.ranges() {
            let range_count = range.end() - range.start() + 1;
            if remaining >= range_count {
                selected |= &RidSet::from_iter(range);
                if remaining == range_count {
                    break;
                }
                remaining -= range_count;
            } else {
                let sub_range = *range.start()..=(range.start() + remaining - 1);
                selected |= &RidSet::from_iter(sub_range);
                break;
            }
        }
        Some(selected)
    }

    fn to_rids(&self) -> Vec<u32> {
        self.iter().collect()
    }

    fn from_rids<I: IntoIterator<Item = u32>>(rids: I) -> RidSet {
        RidSet::from_iter(rids)
    }
}
