use std::ops::Range;

/// Индекс символа в строке (не байта).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CharIndex(pub usize);

/// Переводит диапазон байт в диапазон символов. `None`, если границы не попадают на начало символа.
pub fn get_char_range(s: &str, range: Range<usize>) -> Option<Range<CharIndex>> {
	let mut iter = s
		.char_indices()
		.enumerate()
		.map(|(char_position, (index, _))| (CharIndex(char_position), index))
		.chain(std::iter::once((CharIndex(s.chars().count()), s.len())));
	let start = iter.find(|(_, index)| *index == range.start)?.0;
	let end = if range.end == range.start {
		start
	} else {
		iter.find(|(_, index)| *index == range.end)?.0
	};
	Some(start..end)
}
