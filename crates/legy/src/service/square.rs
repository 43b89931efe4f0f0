// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Square (group chat) RPC, including the event fetchers the cursor
//! workers drive.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::thrift::{Protocol, Struct, Ttype, Value};

use super::model::{expect_struct, FetchChatEvents, FetchMyEvents};
use super::{ServiceClient, SQUARE_PATH};

/// Parameters of one backlog fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchChatEventsRequest {
    pub chat_mid: String,
    pub sync_token: Option<String>,
    pub continuation_token: Option<String>,
    pub limit: i32,
    /// 1 = default, 2 = ask the server to prefetch sender profile data.
    pub fetch_type: i32,
    pub subscription_id: i64,
}

/// The seam fetch workers pull events through. Production wires
/// [`SquareService`]; unit tests script their own source.
#[async_trait]
pub trait SquareEvents: Send + Sync {
    async fn fetch_chat_events(&self, req: FetchChatEventsRequest) -> Result<FetchChatEvents>;
}

pub struct SquareService {
    client: Arc<ServiceClient>,
}

impl SquareService {
    pub fn new(client: Arc<ServiceClient>) -> Self {
        Self { client }
    }

    /// Account-wide event stream (also the push sign-on's initial call).
    pub async fn fetch_my_events(
        &self,
        subscription_id: i64,
        sync_token: Option<&str>,
        continuation_token: Option<&str>,
        limit: i32,
    ) -> Result<FetchMyEvents> {
        let request = Struct::new()
            .with(1, Value::I64(subscription_id))
            .with_opt(2, sync_token.map(Value::string))
            .with(3, Value::I32(limit))
            .with_opt(4, continuation_token.map(Value::string));
        let args = Struct::new().with(1, Value::Struct(request));
        let payload =
            self.client.call(SQUARE_PATH, Protocol::Compact, "fetchMyEvents", args).await?;
        Ok(FetchMyEvents::from_struct(&expect_struct(payload, "fetchMyEvents")?))
    }

    /// Build the Thrift args for `fetchMyEvents`; the push sign-on encodes
    /// this same call onto the stream.
    pub fn fetch_my_events_args(subscription_id: i64, sync_token: Option<&str>, limit: i32) -> Struct {
        let request = Struct::new()
            .with(1, Value::I64(subscription_id))
            .with_opt(2, sync_token.map(Value::string))
            .with(3, Value::I32(limit));
        Struct::new().with(1, Value::Struct(request))
    }

    pub async fn send_message(&self, chat_mid: &str, text: &str) -> Result<Struct> {
        let seq = self.client.next_reqseq("square");
        let message = Struct::new()
            .with(2, Value::string(chat_mid))
            .with(10, Value::string(text))
            .with(15, Value::I32(0))
            .with(18, Value::Map(Ttype::Binary, Ttype::Binary, Vec::new()));
        let request = Struct::new().with(1, Value::I32(seq)).with(2, Value::Struct(message));
        let args = Struct::new().with(1, Value::Struct(request));
        let payload = self.client.call(SQUARE_PATH, Protocol::Compact, "sendMessage", args).await?;
        expect_struct(payload, "sendMessage")
    }

    pub async fn mark_as_read(&self, chat_mid: &str, message_id: &str) -> Result<()> {
        let request = Struct::new()
            .with(2, Value::string(chat_mid))
            .with(4, Value::string(message_id));
        let args = Struct::new().with(1, Value::Struct(request));
        self.client.call(SQUARE_PATH, Protocol::Compact, "markAsRead", args).await?;
        Ok(())
    }

    pub async fn get_square_chat(&self, chat_mid: &str) -> Result<Struct> {
        let request = Struct::new().with(1, Value::string(chat_mid));
        let args = Struct::new().with(1, Value::Struct(request));
        let payload =
            self.client.call(SQUARE_PATH, Protocol::Compact, "getSquareChat", args).await?;
        expect_struct(payload, "getSquareChat")
    }

    pub async fn find_square_by_invitation_ticket(&self, ticket: &str) -> Result<Struct> {
        let request = Struct::new().with(2, Value::string(ticket));
        self.call_struct("findSquareByInvitationTicket", request).await
    }

    // The remaining operations return the reply as a tagged struct; the
    // cursor workers never touch them, so callers map what they need.

    pub async fn get_square(&self, square_mid: &str) -> Result<Struct> {
        self.call_struct("getSquare", Struct::new().with(2, Value::string(square_mid))).await
    }

    pub async fn get_joined_squares(
        &self,
        continuation_token: Option<&str>,
        limit: i32,
    ) -> Result<Struct> {
        let request = Struct::new()
            .with_opt(2, continuation_token.map(Value::string))
            .with(3, Value::I32(limit));
        self.call_struct("getJoinedSquares", request).await
    }

    pub async fn search_squares(
        &self,
        query: &str,
        continuation_token: Option<&str>,
        limit: i32,
    ) -> Result<Struct> {
        let request = Struct::new()
            .with(2, Value::string(query))
            .with_opt(3, continuation_token.map(Value::string))
            .with(4, Value::I32(limit));
        self.call_struct("searchSquares", request).await
    }

    /// Join a square under a member display name.
    pub async fn join_square(&self, square_mid: &str, display_name: &str) -> Result<Struct> {
        let member = Struct::new()
            .with(2, Value::string(square_mid))
            .with(3, Value::string(display_name))
            .with(5, Value::Bool(false)); // ableToReceiveMessage
        let request = Struct::new()
            .with(2, Value::string(square_mid))
            .with(3, Value::Struct(member));
        self.call_struct("joinSquare", request).await
    }

    pub async fn leave_square(&self, square_mid: &str) -> Result<Struct> {
        self.call_struct("leaveSquare", Struct::new().with(2, Value::string(square_mid))).await
    }

    pub async fn invite_into_square_chat(
        &self,
        invitee_mids: &[String],
        chat_mid: &str,
    ) -> Result<Struct> {
        let mids = invitee_mids.iter().map(|m| Value::string(m.clone())).collect();
        let request = Struct::new()
            .with(1, Value::List(Ttype::Binary, mids))
            .with(2, Value::string(chat_mid));
        self.call_struct("inviteIntoSquareChat", request).await
    }

    pub async fn invite_to_square(
        &self,
        square_mid: &str,
        invitee_mids: &[String],
        chat_mid: &str,
    ) -> Result<Struct> {
        let mids = invitee_mids.iter().map(|m| Value::string(m.clone())).collect();
        let request = Struct::new()
            .with(2, Value::string(square_mid))
            .with(3, Value::List(Ttype::Binary, mids))
            .with(4, Value::string(chat_mid));
        self.call_struct("inviteToSquare", request).await
    }

    /// React to a message (2 = nice, 3 = love, 4 = fun, 5 = amazing,
    /// 6 = sad, 7 = omg; 1 undoes).
    pub async fn react_to_message(
        &self,
        chat_mid: &str,
        message_id: &str,
        reaction_type: i32,
    ) -> Result<Struct> {
        let request = Struct::new()
            .with(1, Value::I32(0)) // reqSeq
            .with(2, Value::string(chat_mid))
            .with(3, Value::string(message_id))
            .with(4, Value::I32(reaction_type));
        self.call_struct("reactToMessage", request).await
    }

    pub async fn get_square_message_reactions(
        &self,
        chat_mid: &str,
        message_id: &str,
        reaction_type: i32,
        continuation_token: Option<&str>,
        limit: i32,
    ) -> Result<Struct> {
        let request = Struct::new()
            .with(1, Value::string(chat_mid))
            .with(2, Value::string(message_id))
            .with(3, Value::I32(reaction_type))
            .with_opt(4, continuation_token.map(Value::string))
            .with(5, Value::I32(limit));
        self.call_struct("getSquareMessageReactions", request).await
    }

    /// Destroy a message for everyone in the chat.
    pub async fn destroy_message(&self, chat_mid: &str, message_id: &str) -> Result<Struct> {
        let request = Struct::new()
            .with(2, Value::string(chat_mid))
            .with(4, Value::string(message_id));
        self.call_struct("destroyMessage", request).await
    }

    pub async fn unsend_message(&self, chat_mid: &str, message_id: &str) -> Result<Struct> {
        let request = Struct::new()
            .with(2, Value::string(chat_mid))
            .with(3, Value::string(message_id));
        self.call_struct("unsendMessage", request).await
    }

    pub async fn get_square_members(&self, member_mids: &[String]) -> Result<Struct> {
        let mids = member_mids.iter().map(|m| Value::string(m.clone())).collect();
        let request = Struct::new().with(2, Value::Set(Ttype::Binary, mids));
        self.call_struct("getSquareMembers", request).await
    }

    pub async fn get_square_chat_member(
        &self,
        member_mid: &str,
        chat_mid: &str,
    ) -> Result<Struct> {
        let request = Struct::new()
            .with(2, Value::string(member_mid))
            .with(3, Value::string(chat_mid));
        self.call_struct("getSquareChatMember", request).await
    }

    pub async fn get_square_chat_members(
        &self,
        chat_mid: &str,
        continuation_token: Option<&str>,
        limit: i32,
    ) -> Result<Struct> {
        let request = Struct::new()
            .with(1, Value::string(chat_mid))
            .with_opt(2, continuation_token.map(Value::string))
            .with(3, Value::I32(limit));
        self.call_struct("getSquareChatMembers", request).await
    }

    pub async fn get_joinable_square_chats(
        &self,
        square_mid: &str,
        continuation_token: Option<&str>,
        limit: i32,
    ) -> Result<Struct> {
        let request = Struct::new()
            .with(1, Value::string(square_mid))
            .with_opt(10, continuation_token.map(Value::string))
            .with(11, Value::I32(limit));
        self.call_struct("getJoinableSquareChats", request).await
    }

    pub async fn get_square_chat_announcements(&self, chat_mid: &str) -> Result<Struct> {
        self.call_struct(
            "getSquareChatAnnouncements",
            Struct::new().with(2, Value::string(chat_mid)),
        )
        .await
    }

    pub async fn delete_square_chat_announcement(
        &self,
        chat_mid: &str,
        announcement_seq: i64,
    ) -> Result<Struct> {
        let request = Struct::new()
            .with(2, Value::string(chat_mid))
            .with(3, Value::I64(announcement_seq));
        self.call_struct("deleteSquareChatAnnouncement", request).await
    }

    pub async fn delete_square_chat(&self, chat_mid: &str, revision: i64) -> Result<Struct> {
        let request = Struct::new()
            .with(2, Value::string(chat_mid))
            .with(3, Value::I64(revision));
        self.call_struct("deleteSquareChat", request).await
    }

    pub async fn get_square_feature_set(&self, square_mid: &str) -> Result<Struct> {
        self.call_struct("getSquareFeatureSet", Struct::new().with(2, Value::string(square_mid)))
            .await
    }

    pub async fn get_invitation_ticket_url(&self, mid: &str) -> Result<Struct> {
        self.call_struct("getInvitationTicketUrl", Struct::new().with(2, Value::string(mid)))
            .await
    }

    /// Drop server-side push subscriptions by id.
    pub async fn remove_subscriptions(&self, subscription_ids: &[i64]) -> Result<Struct> {
        let ids = subscription_ids.iter().map(|id| Value::I64(*id)).collect();
        let request = Struct::new().with(2, Value::List(Ttype::I64, ids));
        self.call_struct("removeSubscriptions", request).await
    }

    pub async fn report_square_chat(
        &self,
        square_mid: &str,
        chat_mid: &str,
        report_type: i32,
        other_reason: Option<&str>,
    ) -> Result<Struct> {
        let request = Struct::new()
            .with(2, Value::string(square_mid))
            .with(3, Value::string(chat_mid))
            .with(5, Value::I32(report_type))
            .with_opt(6, other_reason.map(Value::string));
        self.call_struct("reportSquareChat", request).await
    }

    async fn call_struct(&self, method: &str, request: Struct) -> Result<Struct> {
        let args = Struct::new().with(1, Value::Struct(request));
        let payload = self.client.call(SQUARE_PATH, Protocol::Compact, method, args).await?;
        expect_struct(payload, method)
    }
}

#[async_trait]
impl SquareEvents for SquareService {
    async fn fetch_chat_events(&self, req: FetchChatEventsRequest) -> Result<FetchChatEvents> {
        let request = Struct::new()
            .with(1, Value::I64(req.subscription_id))
            .with(2, Value::string(req.chat_mid.clone()))
            .with_opt(3, req.sync_token.clone().map(Value::string))
            .with(4, Value::I32(req.limit))
            .with(5, Value::I32(1)) // direction
            .with(6, Value::I32(1)) // inclusive
            .with_opt(7, req.continuation_token.clone().map(Value::string))
            .with(8, Value::I32(req.fetch_type));
        let args = Struct::new().with(1, Value::Struct(request));
        let payload = self
            .client
            .call(SQUARE_PATH, Protocol::Compact, "fetchSquareChatEvents", args)
            .await?;
        Ok(FetchChatEvents::from_struct(&expect_struct(payload, "fetchSquareChatEvents")?))
    }
}
