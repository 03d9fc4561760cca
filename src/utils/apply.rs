/// Позволяет писать `expr.apply(Expression)` вместо `Expression(expr)` в конце длинной цепочки.
pub trait Apply {
	fn apply<F, R>(self, f: F) -> R
	where
		Self: Sized,
		F: FnOnce(Self) -> R,
	{
		f(self)
	}
}

impl<T: ?Sized> Apply for T {}
