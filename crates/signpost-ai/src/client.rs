use anyhow::Result;
use async_trait::async_trait;

/// 生成模型客户端 trait（支持多模型扩展）
///
/// Output is raw text and is never trusted until it has passed schema and
/// guard validation.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// 模型提供商名称
    fn provider(&self) -> &str;

    /// 模型名称
    fn model_name(&self) -> &str;

    /// 发送 system + user prompt，返回模型原始文本
    async fn call(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}
