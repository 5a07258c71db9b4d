use async_trait::async_trait;

// Right now, all this trait does is allow us to call `cleanup` in a loop in `main.rs`.
#[async_trait]
pub trait Cleaner {
    async fn cleanup(&self);
}
