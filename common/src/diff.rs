//! 履歴リストの差分計算
//!
//! 表示中のリストと再読み込みしたリストから、最小の編集スクリプト
//! （削除・移動・挿入・内容変更）を求める。
//!
//! ## 手順
//! 1. 新リストにないキーを後ろから削除
//! 2. 残ったキー列と新リスト側の共通キー列でLCSを取り、LCSに含まれないものだけ移動
//! 3. 新規キーを前から挿入
//! 4. キーが同じで内容が異なるものを変更
//!
//! 各操作は直前の操作を適用した後のリストに対するインデックスを持つ。

use crate::types::PredictionRecord;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// 同一スロット判定に使うキー
pub trait Keyed {
    type Key: Eq + Hash + Clone;

    fn key(&self) -> Self::Key;
}

impl Keyed for PredictionRecord {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

/// 編集操作
#[derive(Debug, Clone, PartialEq)]
pub enum Edit<T> {
    Remove { index: usize },
    /// `from` から取り出し、取り出した後のリストの `to` に挿入
    Move { from: usize, to: usize },
    Insert { index: usize, item: T },
    Change { index: usize, item: T },
}

/// 編集スクリプト
#[derive(Debug, Clone, PartialEq)]
pub struct Patch<T> {
    ops: Vec<Edit<T>>,
}

impl<T: Clone> Patch<T> {
    pub fn ops(&self) -> &[Edit<T>] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// 旧リストにパッチを適用
    ///
    /// パッチの計算元と異なるリストでインデックスが範囲外になった場合は `None`
    pub fn apply(&self, old: &[T]) -> Option<Vec<T>> {
        let mut list = old.to_vec();

        for op in &self.ops {
            match op {
                Edit::Remove { index } => {
                    if *index >= list.len() {
                        return None;
                    }
                    list.remove(*index);
                }
                Edit::Move { from, to } => {
                    if *from >= list.len() {
                        return None;
                    }
                    let item = list.remove(*from);
                    if *to > list.len() {
                        return None;
                    }
                    list.insert(*to, item);
                }
                Edit::Insert { index, item } => {
                    if *index > list.len() {
                        return None;
                    }
                    list.insert(*index, item.clone());
                }
                Edit::Change { index, item } => {
                    *list.get_mut(*index)? = item.clone();
                }
            }
        }

        Some(list)
    }

    /// (削除, 移動, 挿入, 変更) の件数
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        self.ops.iter().fold((0, 0, 0, 0), |(r, m, i, c), op| match op {
            Edit::Remove { .. } => (r + 1, m, i, c),
            Edit::Move { .. } => (r, m + 1, i, c),
            Edit::Insert { .. } => (r, m, i + 1, c),
            Edit::Change { .. } => (r, m, i, c + 1),
        })
    }
}

/// 2つのリストの差分を計算
///
/// キーが重複している場合は移動の対応が決まらないため、全削除+全挿入を返す。
pub fn diff<T>(old: &[T], new: &[T]) -> Patch<T>
where
    T: Keyed + PartialEq + Clone,
{
    let old_keys: Vec<T::Key> = old.iter().map(T::key).collect();
    let new_keys: Vec<T::Key> = new.iter().map(T::key).collect();

    if has_duplicates(&old_keys) || has_duplicates(&new_keys) {
        return replace_all(old, new);
    }

    let old_set: HashSet<&T::Key> = old_keys.iter().collect();
    let new_set: HashSet<&T::Key> = new_keys.iter().collect();
    let mut ops = Vec::new();

    // 1. 削除（インデックスがずれないよう後ろから）
    for (i, key) in old_keys.iter().enumerate().rev() {
        if !new_set.contains(key) {
            ops.push(Edit::Remove { index: i });
        }
    }

    let mut working: Vec<T::Key> = old_keys
        .iter()
        .filter(|k| new_set.contains(k))
        .cloned()
        .collect();
    let target: Vec<T::Key> = new_keys
        .iter()
        .filter(|k| old_set.contains(k))
        .cloned()
        .collect();

    // 2. 移動（LCSに含まれないものだけ、直前の確定済み要素の後ろへ）
    let anchored: HashSet<T::Key> = lcs(&working, &target).into_iter().collect();
    for (k, key) in target.iter().enumerate() {
        if anchored.contains(key) {
            continue;
        }
        let Some(from) = working.iter().position(|w| w == key) else {
            continue;
        };
        let item = working.remove(from);
        let to = if k == 0 {
            0
        } else {
            working
                .iter()
                .position(|w| *w == target[k - 1])
                .map_or(0, |p| p + 1)
        };
        working.insert(to, item);
        if from != to {
            ops.push(Edit::Move { from, to });
        }
    }

    // 3. 挿入（前から）
    for (j, key) in new_keys.iter().enumerate() {
        if !old_set.contains(key) {
            ops.push(Edit::Insert {
                index: j,
                item: new[j].clone(),
            });
        }
    }

    // 4. 内容変更
    let old_by_key: HashMap<&T::Key, &T> = old_keys.iter().zip(old.iter()).collect();
    for (j, key) in new_keys.iter().enumerate() {
        if let Some(previous) = old_by_key.get(key) {
            if **previous != new[j] {
                ops.push(Edit::Change {
                    index: j,
                    item: new[j].clone(),
                });
            }
        }
    }

    Patch { ops }
}

fn has_duplicates<K: Eq + Hash>(keys: &[K]) -> bool {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.iter().any(|k| !seen.insert(k))
}

fn replace_all<T: Clone>(old: &[T], new: &[T]) -> Patch<T> {
    let mut ops: Vec<Edit<T>> = (0..old.len())
        .rev()
        .map(|index| Edit::Remove { index })
        .collect();
    ops.extend(new.iter().enumerate().map(|(index, item)| Edit::Insert {
        index,
        item: item.clone(),
    }));
    Patch { ops }
}

/// 最長共通部分列（DP、同長の場合は `a` 側を先に進める）
fn lcs<K: Eq + Clone>(a: &[K], b: &[K]) -> Vec<K> {
    let (n, m) = (a.len(), b.len());
    let mut table = vec![vec![0u32; m + 1]; n + 1];

    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if a[i] == b[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    let mut result = Vec::with_capacity(table[0][0] as usize);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            result.push(a[i].clone());
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, result: &str) -> PredictionRecord {
        PredictionRecord::new(id, format!("/images/{}.jpg", id), result)
    }

    fn list(ids: &[&str]) -> Vec<PredictionRecord> {
        ids.iter().map(|id| rec(id, "benign with 87.00%")).collect()
    }

    fn assert_roundtrip(old: &[PredictionRecord], new: &[PredictionRecord]) {
        let patch = diff(old, new);
        assert_eq!(
            patch.apply(old).as_deref(),
            Some(new),
            "patch {:?} did not turn old into new",
            patch.ops()
        );
    }

    fn permutations(items: &[&'static str]) -> Vec<Vec<&'static str>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head);
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn test_identical_lists_yield_empty_patch() {
        let l = list(&["a", "b", "c"]);
        assert!(diff(&l, &l).is_empty());
        assert!(diff::<PredictionRecord>(&[], &[]).is_empty());
    }

    #[test]
    fn test_from_empty_is_pure_inserts() {
        let l = list(&["a", "b", "c"]);
        let patch = diff(&[], &l);
        assert_eq!(patch.counts(), (0, 0, 3, 0));
        for (i, op) in patch.ops().iter().enumerate() {
            assert_eq!(
                op,
                &Edit::Insert {
                    index: i,
                    item: l[i].clone()
                }
            );
        }
        assert_roundtrip(&[], &l);
    }

    #[test]
    fn test_to_empty_is_pure_removes() {
        let l = list(&["a", "b", "c"]);
        let patch = diff(&l, &[]);
        assert_eq!(patch.counts(), (3, 0, 0, 0));
        assert_eq!(patch.apply(&l), Some(vec![]));
    }

    #[test]
    fn test_single_move_is_minimal() {
        let old = list(&["a", "b", "c", "d"]);
        let new = list(&["b", "c", "d", "a"]);
        let patch = diff(&old, &new);
        assert_eq!(patch.ops(), &[Edit::Move { from: 0, to: 3 }]);
        assert_roundtrip(&old, &new);
    }

    #[test]
    fn test_content_change_keeps_slot() {
        let old = list(&["a", "b"]);
        let mut new = old.clone();
        new[1].result = "malignant with 55.10%".to_string();

        let patch = diff(&old, &new);
        assert_eq!(
            patch.ops(),
            &[Edit::Change {
                index: 1,
                item: new[1].clone()
            }]
        );
        assert_roundtrip(&old, &new);
    }

    #[test]
    fn test_mixed_edits() {
        let old = list(&["a", "b", "c", "d", "e"]);
        let mut new = list(&["e", "b", "x", "d", "y"]);
        new[3].result = "changed".to_string();

        let patch = diff(&old, &new);
        let (removes, moves, inserts, changes) = patch.counts();
        assert_eq!(removes, 2); // a, c
        assert_eq!(moves, 1); // e
        assert_eq!(inserts, 2); // x, y
        assert_eq!(changes, 1); // d
        assert_roundtrip(&old, &new);
    }

    #[test]
    fn test_all_permutations_roundtrip() {
        let base = ["a", "b", "c", "d"];
        let old = list(&base);
        for perm in permutations(&base) {
            let new = list(&perm);
            assert_roundtrip(&old, &new);

            // 削除・挿入を混ぜたケース
            let mut with_insert = perm.clone();
            with_insert.insert(2, "z");
            with_insert.remove(0);
            assert_roundtrip(&old, &list(&with_insert));
        }
    }

    #[test]
    fn test_moves_never_exceed_displaced_items() {
        let old = list(&["a", "b", "c", "d", "e", "f"]);
        let new = list(&["a", "c", "b", "d", "f", "e"]);
        let (_, moves, _, _) = diff(&old, &new).counts();
        assert_eq!(moves, 2);
    }

    #[test]
    fn test_duplicate_keys_fall_back_to_replace() {
        let old = vec![rec("a", "x"), rec("a", "y")];
        let new = list(&["a", "b"]);
        let patch = diff(&old, &new);
        assert_eq!(patch.counts(), (2, 0, 2, 0));
        assert_roundtrip(&old, &new);
    }

    #[test]
    fn test_diff_is_deterministic() {
        let old = list(&["a", "b", "c", "d"]);
        let new = list(&["d", "c", "b", "a"]);
        assert_eq!(diff(&old, &new), diff(&old, &new));
    }

    #[test]
    fn test_apply_on_wrong_list_returns_none() {
        let old = list(&["a", "b", "c"]);
        let patch = diff(&old, &[]);
        assert_eq!(patch.apply(&[]), None);
    }
}
