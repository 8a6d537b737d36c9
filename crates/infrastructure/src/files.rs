//! 本地文件存储
//!
//! 附件 blob 的删除端口实现。删除是尽力而为的：文件已不存在
//! 算成功（幂等），其他 IO 错误上报给调用方计数。

use std::path::PathBuf;

use application::{FileStorage, FileStorageError};
use async_trait::async_trait;

pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn delete(&self, storage_path: &str) -> Result<(), FileStorageError> {
        // 存储路径是服务端生成的，仍然拒绝任何上跳成分
        if storage_path.split('/').any(|part| part == "..") {
            return Err(FileStorageError::failed(format!(
                "refusing path with parent components: {storage_path}"
            )));
        }

        let full = self.root.join(storage_path);
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(FileStorageError::failed(format!(
                "failed to delete {}: {err}",
                full.display()
            ))),
        }
    }
}
