//! Minimal edit scripts between ordered sequences.
//!
//! A [`Splice`] is expressed in the coordinates of the *new* sequence:
//! applying a list of splices front to back to the old sequence, each one replacing
//! `removed.len()` items at `index` with `added_count` items taken from the new sequence at the same `index`,
//! reproduces the new sequence exactly.

use core::{cmp::min, mem, ops::Range};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splice<T> {
	pub index: usize,
	pub removed: Vec<T>,
	pub added_count: usize,
}
impl<T> Splice<T> {
	#[must_use]
	pub fn new(index: usize, removed: Vec<T>, added_count: usize) -> Self {
		Self { index, removed, added_count }
	}

	/// The range this splice occupies in the new sequence.
	#[must_use]
	pub fn added(&self) -> Range<usize> {
		self.index..self.index + self.added_count
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
	Leave,
	Update,
	Add,
	Delete,
}

/// Computes the splices that turn `previous` into `current`.
///
/// Items are only ever compared through `equals`. Pass an identity comparison to diff by reference.
/// Updates count as a deletion plus an insertion, so untouched runs stay as long as possible.
///
/// Runs in O(|current| · |previous|) time and space after trimming the shared prefix and suffix.
pub fn calculate_splices<T: Clone>(current: &[T], previous: &[T], equals: impl Fn(&T, &T) -> bool) -> Vec<Splice<T>> {
	calculate_splices_in_range(current, 0..current.len(), previous, 0..previous.len(), equals)
}

/// Like [`calculate_splices`], but only compares `current[current_range]` against `previous[previous_range]`.
///
/// The shared prefix (suffix) is only trimmed when both ranges start (end) at their sequence's boundary.
/// Resulting indices are relative to the whole of `current`.
pub fn calculate_splices_in_range<T: Clone>(
	current: &[T],
	current_range: Range<usize>,
	previous: &[T],
	previous_range: Range<usize>,
	equals: impl Fn(&T, &T) -> bool,
) -> Vec<Splice<T>> {
	let Range { start: mut current_start, end: mut current_end } = current_range;
	let Range { start: mut previous_start, end: mut previous_end } = previous_range;
	debug_assert!(current_start <= current_end && current_end <= current.len());
	debug_assert!(previous_start <= previous_end && previous_end <= previous.len());

	let min_length = min(current_end - current_start, previous_end - previous_start);
	let prefix_count = if current_start == 0 && previous_start == 0 {
		shared_prefix(current, previous, min_length, &equals)
	} else {
		0
	};
	let suffix_count = if current_end == current.len() && previous_end == previous.len() {
		shared_suffix(current, previous, min_length - prefix_count, &equals)
	} else {
		0
	};

	current_start += prefix_count;
	previous_start += prefix_count;
	current_end -= suffix_count;
	previous_end -= suffix_count;

	if current_start == current_end && previous_start == previous_end {
		return Vec::new();
	}
	if current_start == current_end {
		return vec![Splice::new(current_start, previous[previous_start..previous_end].to_vec(), 0)];
	}
	if previous_start == previous_end {
		return vec![Splice::new(current_start, Vec::new(), current_end - current_start)];
	}

	let edits = edits_from_distances(&edit_distances(&current[current_start..current_end], &previous[previous_start..previous_end], &equals));

	let mut splices = Vec::new();
	let mut splice: Option<Splice<T>> = None;
	let mut index = current_start;
	let mut previous_index = previous_start;
	for edit in edits {
		match edit {
			Edit::Leave => {
				splices.extend(splice.take());
				index += 1;
				previous_index += 1;
			}
			Edit::Update => {
				let splice = splice.get_or_insert_with(|| Splice::new(index, Vec::new(), 0));
				splice.added_count += 1;
				splice.removed.push(previous[previous_index].clone());
				index += 1;
				previous_index += 1;
			}
			Edit::Add => {
				splice.get_or_insert_with(|| Splice::new(index, Vec::new(), 0)).added_count += 1;
				index += 1;
			}
			Edit::Delete => {
				splice
					.get_or_insert_with(|| Splice::new(index, Vec::new(), 0))
					.removed
					.push(previous[previous_index].clone());
				previous_index += 1;
			}
		}
	}
	splices.extend(splice);
	splices
}

fn shared_prefix<T>(current: &[T], previous: &[T], search_length: usize, equals: &impl Fn(&T, &T) -> bool) -> usize {
	(0..search_length).find(|&i| !equals(&current[i], &previous[i])).unwrap_or(search_length)
}

fn shared_suffix<T>(current: &[T], previous: &[T], search_length: usize, equals: &impl Fn(&T, &T) -> bool) -> usize {
	current
		.iter()
		.rev()
		.zip(previous.iter().rev())
		.take(search_length)
		.take_while(|&(c, p)| equals(c, p))
		.count()
}

/// Rows follow `previous`, columns follow `current`. Substitution is not an edit.
fn edit_distances<T>(current: &[T], previous: &[T], equals: &impl Fn(&T, &T) -> bool) -> Vec<Vec<usize>> {
	let mut distances = vec![vec![0; current.len() + 1]; previous.len() + 1];
	for (i, row) in distances.iter_mut().enumerate() {
		row[0] = i;
	}
	for (j, cell) in distances[0].iter_mut().enumerate() {
		*cell = j;
	}

	for i in 1..=previous.len() {
		for j in 1..=current.len() {
			distances[i][j] = if equals(&current[j - 1], &previous[i - 1]) {
				distances[i - 1][j - 1]
			} else {
				min(distances[i - 1][j], distances[i][j - 1]) + 1
			};
		}
	}
	distances
}

/// Walks from the bottom right corner back to the origin.
///
/// The diagonal wins ties unless deleting or adding is strictly cheaper. Deleting wins a tie against adding.
fn edits_from_distances(distances: &[Vec<usize>]) -> Vec<Edit> {
	let mut i = distances.len() - 1;
	let mut j = distances[0].len() - 1;
	let mut current = distances[i][j];
	let mut edits = Vec::with_capacity(i + j);

	while i > 0 || j > 0 {
		if i == 0 {
			edits.push(Edit::Add);
			j -= 1;
			continue;
		}
		if j == 0 {
			edits.push(Edit::Delete);
			i -= 1;
			continue;
		}

		let diagonal = distances[i - 1][j - 1];
		let delete = distances[i - 1][j];
		let add = distances[i][j - 1];

		let cheapest = if delete < add { min(delete, diagonal) } else { min(add, diagonal) };
		if cheapest == diagonal {
			if diagonal == current {
				edits.push(Edit::Leave);
			} else {
				edits.push(Edit::Update);
				current = diagonal;
			}
			i -= 1;
			j -= 1;
		} else if cheapest == delete {
			edits.push(Edit::Delete);
			i -= 1;
			current = delete;
		} else {
			edits.push(Edit::Add);
			j -= 1;
			current = add;
		}
	}

	edits.reverse();
	edits
}

/// Applies `splices` (as produced for `current`) to `previous` in place.
pub fn apply_splices<T: Clone>(previous: &mut Vec<T>, current: &[T], splices: &[Splice<T>]) {
	for splice in splices {
		let removed_end = splice.index + splice.removed.len();
		drop(previous.splice(splice.index..removed_end, current[splice.added()].iter().cloned()));
	}
}

/// `Some(overlap)` if the two half-open ranges overlap or touch.
fn intersect(start_1: usize, end_1: usize, start_2: usize, end_2: usize) -> Option<usize> {
	if end_1 < start_2 || end_2 < start_1 {
		None
	} else if end_1 == start_2 || end_2 == start_1 {
		Some(0)
	} else if start_1 < start_2 {
		Some(min(end_1, end_2) - start_2)
	} else {
		Some(min(end_1, end_2) - start_1)
	}
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
fn shift(index: &mut usize, offset: isize) {
	*index = (*index as isize + offset) as usize;
}

#[allow(clippy::cast_possible_wrap)]
fn net(added_count: usize, removed_count: usize) -> isize {
	added_count as isize - removed_count as isize
}

/// Folds one point edit into `splices` in place.
///
/// `index` is in the coordinates of the sequence *after* all of `splices`, `removed` are the items it removed there.
/// Overlapping or adjacent splices merge, later ones shift by the net length change,
/// and a merge that cancels out completely disappears.
pub fn merge_splice<T: Clone>(splices: &mut Vec<Splice<T>>, index: usize, removed: Vec<T>, added_count: usize) {
	let mut splice = Splice::new(index, removed, added_count);
	let mut inserted = false;
	let mut insertion_offset = 0_isize;

	let mut i = 0;
	while i < splices.len() {
		shift(&mut splices[i].index, insertion_offset);
		if inserted {
			i += 1;
			continue;
		}

		let current = &splices[i];
		let overlap = intersect(
			splice.index,
			splice.index + splice.removed.len(),
			current.index,
			current.index + current.added_count,
		);

		if let Some(overlap) = overlap {
			let current = splices.remove(i);
			insertion_offset -= net(current.added_count, current.removed.len());
			splice.added_count += current.added_count - overlap;
			let delete_count = splice.removed.len() + current.removed.len() - overlap;

			if splice.added_count == 0 && delete_count == 0 {
				// The edits cancelled each other out.
				inserted = true;
			} else {
				let mut removed = current.removed;
				if splice.index < current.index {
					let mut prepend = splice.removed[..current.index - splice.index].to_vec();
					prepend.append(&mut removed);
					removed = prepend;
				}
				if splice.index + splice.removed.len() > current.index + current.added_count {
					removed.extend_from_slice(&splice.removed[current.index + current.added_count - splice.index..]);
				}
				splice.removed = removed;
				if current.index < splice.index {
					splice.index = current.index;
				}
			}
		} else if splice.index < current.index {
			let offset = net(splice.added_count, splice.removed.len());
			splices.insert(i, mem::replace(&mut splice, Splice::new(0, Vec::new(), 0)));
			inserted = true;
			i += 1;
			shift(&mut splices[i].index, offset);
			insertion_offset += offset;
			i += 1;
		} else {
			i += 1;
		}
	}

	if !inserted {
		splices.push(splice);
	}
}

/// Coalesces a stream of single-position change notifications into one splice set.
#[derive(Debug, Clone)]
pub struct SpliceMerger<T> {
	splices: Vec<Splice<T>>,
}
impl<T> Default for SpliceMerger<T> {
	fn default() -> Self {
		Self { splices: Vec::new() }
	}
}
impl<T: Clone> SpliceMerger<T> {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Records that `removed` was replaced by `added_count` items at `index` of the sequence as it is *now*.
	pub fn push(&mut self, index: usize, removed: Vec<T>, added_count: usize) {
		merge_splice(&mut self.splices, index, removed, added_count);
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.splices.is_empty()
	}

	#[must_use]
	pub fn splices(&self) -> &[Splice<T>] {
		&self.splices
	}

	/// The merged splices as recorded.
	#[must_use]
	pub fn finish(self) -> Vec<Splice<T>> {
		self.splices
	}

	/// Re-diffs every merged splice against `current` so that items removed and re-added in place drop out.
	pub fn project(self, current: &[T], equals: impl Fn(&T, &T) -> bool) -> Vec<Splice<T>> {
		let mut projected = Vec::with_capacity(self.splices.len());
		for splice in self.splices {
			if splice.added_count == 1 && splice.removed.len() == 1 {
				if !equals(&splice.removed[0], &current[splice.index]) {
					projected.push(splice);
				}
				continue;
			}

			let removed_len = splice.removed.len();
			projected.extend(calculate_splices_in_range(current, splice.added(), &splice.removed, 0..removed_len, &equals));
		}
		projected
	}
}
