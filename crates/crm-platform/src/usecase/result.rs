//! Use Case Result Type

use super::error::UseCaseError;

/// Outcome of a use case.
///
/// Failures can be created anywhere; success is only built by the use
/// case itself once its writes went through.
pub enum UseCaseResult<T> {
    Success(T),
    Failure(UseCaseError),
}

impl<T> UseCaseResult<T> {
    pub fn failure(error: UseCaseError) -> Self {
        UseCaseResult::Failure(error)
    }

    pub(crate) fn success(value: T) -> Self {
        UseCaseResult::Success(value)
    }

    /// Convert to a standard Result.
    pub fn into_result(self) -> Result<T, UseCaseError> {
        match self {
            UseCaseResult::Success(v) => Ok(v),
            UseCaseResult::Failure(e) => Err(e),
        }
    }
}

impl<T> From<UseCaseResult<T>> for Result<T, UseCaseError> {
    fn from(result: UseCaseResult<T>) -> Self {
        result.into_result()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for UseCaseResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UseCaseResult::Success(v) => f.debug_tuple("Success").field(v).finish(),
            UseCaseResult::Failure(e) => f.debug_tuple("Failure").field(e).finish(),
        }
    }
}

/// Early-return the failure of a `Result<T, impl Into<UseCaseError>>`.
#[macro_export]
macro_rules! try_use_case {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(err) => return $crate::usecase::UseCaseResult::failure(err.into()),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_result() {
        let result: UseCaseResult<String> = UseCaseResult::success("test".to_string());
        assert_eq!(result.into_result().unwrap(), "test");
    }

    #[test]
    fn test_failure_result() {
        let result: UseCaseResult<String> =
            UseCaseResult::failure(UseCaseError::validation("CODE", "message"));
        let err = Result::<String, UseCaseError>::from(result).unwrap_err();
        assert_eq!(err.code(), "CODE");
    }

    #[test]
    fn test_try_use_case_returns_failure() {
        fn run(input: Result<i32, UseCaseError>) -> UseCaseResult<i32> {
            let value = crate::try_use_case!(input);
            UseCaseResult::success(value * 2)
        }

        assert_eq!(run(Ok(21)).into_result().unwrap(), 42);
        assert_eq!(run(Err(UseCaseError::not_found("X", "absent"))).into_result().unwrap_err().code(), "X");
    }
}
