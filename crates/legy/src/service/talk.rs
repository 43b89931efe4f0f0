// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Talk RPC: profile, contacts, chats, direct messages.

use std::sync::Arc;

use crate::error::Result;
use crate::thrift::{Protocol, Struct, Ttype, Value};

use super::model::{expect_struct, Contact, Profile};
use super::{ServiceClient, TALK_PATH};

pub struct TalkService {
    client: Arc<ServiceClient>,
}

impl TalkService {
    pub fn new(client: Arc<ServiceClient>) -> Self {
        Self { client }
    }

    pub async fn get_profile(&self) -> Result<Profile> {
        let payload =
            self.client.call(TALK_PATH, Protocol::Compact, "getProfile", Struct::new()).await?;
        Profile::from_struct(&expect_struct(payload, "getProfile")?)
    }

    pub async fn get_contact(&self, mid: &str) -> Result<Contact> {
        let args = Struct::new().with(2, Value::string(mid));
        let payload = self.client.call(TALK_PATH, Protocol::Compact, "getContact", args).await?;
        Contact::from_struct(&expect_struct(payload, "getContact")?)
    }

    pub async fn get_contacts(&self, mids: &[String]) -> Result<Vec<Contact>> {
        let items = mids.iter().map(|m| Value::string(m.clone())).collect();
        let args = Struct::new().with(2, Value::List(Ttype::Binary, items));
        let payload = self.client.call(TALK_PATH, Protocol::Compact, "getContacts", args).await?;

        let mut out = Vec::new();
        if let Some(list) = payload.as_ref().and_then(Value::as_list) {
            for item in list {
                if let Some(s) = item.as_struct() {
                    out.push(Contact::from_struct(s)?);
                }
            }
        }
        Ok(out)
    }

    /// All chat mids the account belongs to, `(member, invited)`.
    pub async fn get_all_chat_mids(&self) -> Result<(Vec<String>, Vec<String>)> {
        let request = Struct::new().with(1, Value::Bool(true)).with(2, Value::Bool(true));
        let args = Struct::new()
            .with(1, Value::Struct(request))
            .with(2, Value::I32(0)); // syncReason
        let payload =
            self.client.call(TALK_PATH, Protocol::Compact, "getAllChatMids", args).await?;
        let s = expect_struct(payload, "getAllChatMids")?;

        let pick = |id: i16| -> Vec<String> {
            s.get(id)
                .and_then(Value::as_list)
                .map(|items| {
                    items.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect()
                })
                .unwrap_or_default()
        };
        Ok((pick(1), pick(2)))
    }

    /// Chats (groups/rooms) by mid, members and invitees included. The
    /// result stays a tagged struct list; callers pick what they need.
    pub async fn get_chats(&self, chat_mids: &[String]) -> Result<Vec<Struct>> {
        let mids = chat_mids.iter().map(|m| Value::string(m.clone())).collect();
        let request = Struct::new()
            .with(1, Value::List(Ttype::Binary, mids))
            .with(2, Value::Bool(true)) // withMembers
            .with(3, Value::Bool(true)); // withInvitees
        let args = Struct::new().with(1, Value::Struct(request));
        let payload = self.client.call(TALK_PATH, Protocol::Compact, "getChats", args).await?;
        let s = expect_struct(payload, "getChats")?;

        let mut out = Vec::new();
        if let Some(list) = s.get(1).and_then(Value::as_list) {
            for item in list {
                if let Some(chat) = item.as_struct() {
                    out.push(chat.clone());
                }
            }
        }
        Ok(out)
    }

    /// Send a plain text message to a user/room/group mid.
    pub async fn send_message(&self, to: &str, text: &str) -> Result<Struct> {
        let seq = self.client.next_reqseq("talk");
        let message = Struct::new()
            .with(2, Value::string(to))
            .with(10, Value::string(text))
            .with(15, Value::I32(0)); // contentType: text
        let args = Struct::new().with(1, Value::I32(seq)).with(2, Value::Struct(message));
        let payload = self.client.call(TALK_PATH, Protocol::Compact, "sendMessage", args).await?;
        expect_struct(payload, "sendMessage")
    }

    /// Mark a chat as read up to a message id. The core never calls this on
    /// its own; consumers decide.
    pub async fn send_chat_checked(&self, chat_mid: &str, last_message_id: &str) -> Result<()> {
        let seq = self.client.next_reqseq("talk");
        let args = Struct::new()
            .with(1, Value::I32(seq))
            .with(2, Value::string(chat_mid))
            .with(3, Value::string(last_message_id));
        self.client.call(TALK_PATH, Protocol::Compact, "sendChatChecked", args).await?;
        Ok(())
    }
}
