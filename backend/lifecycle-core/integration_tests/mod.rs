mod error;
mod helpers;
mod hooks;

mod manager {
    mod failures;
    mod lifecycle;
}
