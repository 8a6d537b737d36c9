use std::sync::Arc;

use application::{
    EventDispatcher, MessageFanoutService, RoomMemberRepository, RoomPresenceService,
};
use infrastructure::LocalEventDispatcher;

use crate::auth::JwtService;

/// 应用状态
///
/// 每个进程启动时构建一次，显式注入到所有路由和网关，
/// 没有任何环境全局量，测试可以注入内存实现。
#[derive(Clone)]
pub struct AppState {
    pub presence: Arc<RoomPresenceService>,
    pub fanout: Arc<MessageFanoutService>,
    pub members: Arc<dyn RoomMemberRepository>,
    /// 事件的出口（可能带跨实例复制）
    pub dispatcher: Arc<dyn EventDispatcher>,
    /// 进程内广播，网关连接从这里订阅
    pub broadcaster: LocalEventDispatcher,
    pub jwt: Arc<JwtService>,
}

impl AppState {
    pub fn new(
        presence: Arc<RoomPresenceService>,
        fanout: Arc<MessageFanoutService>,
        members: Arc<dyn RoomMemberRepository>,
        dispatcher: Arc<dyn EventDispatcher>,
        broadcaster: LocalEventDispatcher,
        jwt: Arc<JwtService>,
    ) -> Self {
        Self {
            presence,
            fanout,
            members,
            dispatcher,
            broadcaster,
            jwt,
        }
    }
}
