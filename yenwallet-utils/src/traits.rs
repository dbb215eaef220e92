pub trait TrustMe<T>: Sized {
    #[track_caller]
    fn trust_me(self) -> T;
}

impl<T, E> TrustMe<T> for Result<T, E>
where
    E: std::fmt::Debug,
{
    #[track_caller]
    fn trust_me(self) -> T {
        self.expect("Shouldn't fail")
    }
}

impl<T> TrustMe<T> for Option<T> {
    #[track_caller]
    fn trust_me(self) -> T {
        self.expect("Shouldn't fail")
    }
}

/// Normalization of user-entered text fields
pub trait UserInput {
    /// Returns trimmed value or `None` if nothing is left after trimming
    fn non_empty_trimmed(&self) -> Option<&str>;
}

impl<T> UserInput for T
where
    T: AsRef<str> + ?Sized,
{
    fn non_empty_trimmed(&self) -> Option<&str> {
        match self.as_ref().trim() {
            "" => None,
            value => Some(value),
        }
    }
}
