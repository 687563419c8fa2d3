/// Returns `Err($error)` from the enclosing function unless `$predicate` holds.
///
/// ```text
/// ensure!(length <= MAX_BODY_BYTES, ParseError::too_large_body(length, MAX_BODY_BYTES));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
