use annotate_snippets::{
	display_list::{DisplayList, FormatOptions},
	snippet::{Annotation, AnnotationType, Slice, Snippet, SourceAnnotation},
};
use std::iter;
use std::ops::Range;

use crate::utils::char_index::CharIndex;

/// Сообщение об ошибке в формате `snippet`, с подчёркиванием места ошибки в исходной строке.
pub fn error_snippet(title: &str, note: &str, source: &str, range: Range<CharIndex>, color: bool) -> String {
	// Ошибка может указывать на конец строки, поэтому добавляем пробел, на который можно показать.
	let source = format!("{} ", source.trim_end_matches('\n'));
	let last = source.chars().count() - 1;
	let start = range.start.0.min(last);
	let end = range.end.0.max(start + 1).min(last + 1);

	let snippet = Snippet {
		title: Some(Annotation {
			label: Some(title),
			id: None,
			annotation_type: AnnotationType::Error,
		}),
		footer: vec![Annotation {
			label: Some(note),
			id: None,
			annotation_type: AnnotationType::Note,
		}],
		slices: vec![
			Slice {
				source: &source,
				line_start: 1,
				origin: None,
				fold: false,
				annotations: vec![
					SourceAnnotation {
						label: title,
						annotation_type: AnnotationType::Error,
						range: (start, end),
					},
				],
			},
		],
		opt: FormatOptions {
			color,
			..Default::default()
		},
	};
	DisplayList::from(snippet).to_string()
}

/// Строка вида `   ^^^^`, которую можно вывести под выражением, чтобы показать его часть.
pub fn caret_line(range: Range<CharIndex>) -> String {
	iter::repeat(' ')
		.take(range.start.0)
		.chain(iter::repeat('^').take(range.end.0.saturating_sub(range.start.0).max(1)))
		.collect()
}
