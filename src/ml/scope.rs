//! リクエスト単位の中間テンソル管理
//!
//! 推論で確保したテンソルは `Scoped` に包んで保持します。`Scoped` は
//! ドロップ時に必ず解放されます（早期リターンやパニック時も含む）。
//! `TensorScope` が数えるのは生存中の `Scoped` ガードの数で、バックエンド内部の
//! 確保量ではありません。

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct TensorScope {
    live: Arc<AtomicUsize>,
}

impl TensorScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// 値をスコープに登録
    pub fn track<T>(&self, value: T) -> Scoped<T> {
        self.live.fetch_add(1, Ordering::SeqCst);
        Scoped {
            value,
            live: Arc::clone(&self.live),
        }
    }

    /// 生存中のガード数
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// ドロップ時に `TensorScope` のカウントを戻すガード
#[derive(Debug)]
pub struct Scoped<T> {
    value: T,
    live: Arc<AtomicUsize>,
}

impl<T> Deref for Scoped<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> Drop for Scoped<T> {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fails_midway(scope: &TensorScope) -> Result<usize, String> {
        let a = scope.track(vec![1.0f32; 16]);
        let _b = scope.track(vec![2.0f32; 16]);
        let parsed: usize = "not a number".parse().map_err(|_| "boom".to_string())?;
        Ok(parsed + a.len())
    }

    #[test]
    fn test_released_on_scope_exit() {
        let scope = TensorScope::new();
        {
            let a = scope.track(vec![0u8; 4]);
            let b = scope.track(3usize);
            assert_eq!(scope.live(), 2);
            assert_eq!(a.len(), 4);
            assert_eq!(*b, 3);
        }
        assert_eq!(scope.live(), 0);
    }

    #[test]
    fn test_released_on_error_path() {
        let scope = TensorScope::new();
        assert!(fails_midway(&scope).is_err());
        assert_eq!(scope.live(), 0);
    }

    #[test]
    fn test_released_on_panic() {
        let scope = TensorScope::new();
        let cloned = scope.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = cloned.track(1u32);
            panic!("forward pass failed");
        });
        assert!(result.is_err());
        assert_eq!(scope.live(), 0);
    }
}
