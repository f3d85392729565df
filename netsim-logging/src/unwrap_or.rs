/// Logs a best-effort fallible operation's error (with its source chain) at `warn` and continues.
///
/// Several of the topology engine's kernel calls are intentionally best-effort: a failure there
/// is surfaced to the operator but must not abort the run (see the setup summary in `tsim-setup`).
#[macro_export]
macro_rules! unwrap_or_warn {
    ($result:expr, $($arg:tt)*) => {
        if let Err(e) = $result {
            let error: &dyn ::std::error::Error = e.as_ref();
            ::tracing::warn!($($arg)*, $crate::err_with_src(error));
        }
    };
}
