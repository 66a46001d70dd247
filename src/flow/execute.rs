//! Recursive interpreter over compiled flows.
//!
//! Execution starts at the entry node and walks children depth-first. Every
//! node charges the context budgets before running and wraps its errors
//! with a trace frame on the way out, so a failure deep in a subtree reads
//! as a path from the entry to the failing node.

use chrono::Utc;
use futures_util::future::BoxFuture;
use rand::Rng;

use crate::model::MessageData;
use crate::resume::{component_custom_id, modal_custom_id, ResumePointKind};
use crate::thing::Thing;

use super::compile::{CompiledFlow, CompiledNode, NodeIdx};
use super::context::FlowContext;
use super::data::{FlowNodeType, VariableOperation};
use super::error::FlowError;
use super::provider::{ChatCompletionParams, HttpRequest, InteractionResponse};

/// How long an interaction flow may run before a deferred response is sent
/// on its behalf.
const AUTO_DEFER_GRACE: std::time::Duration = std::time::Duration::from_secs(2);

/// Credit prices per operation. AI completions are tiered by model size;
/// everything else is flat.
pub fn credits_cost(node: &CompiledNode) -> usize {
    match node.node_type {
        FlowNodeType::ActionAiChatCompletion => {
            let model = node
                .data
                .ai_chat_completion_data
                .as_ref()
                .map(|d| d.model.as_str())
                .unwrap_or_default();
            if model.contains("nano") {
                5
            } else if model.contains("mini") {
                20
            } else {
                100
            }
        }
        FlowNodeType::ActionHttpRequest => 3,
        t if t.is_action() => 1,
        _ => 0,
    }
}

impl CompiledFlow {
    /// Executes the node and its subtree against the context.
    pub fn execute<'a>(
        &'a self,
        idx: NodeIdx,
        ctx: &'a mut FlowContext,
    ) -> BoxFuture<'a, Result<(), FlowError>> {
        Box::pin(async move {
            let node = self.node(idx);
            ctx.start_operation(credits_cost(node))
                .map_err(|err| trace(node, err))?;
            let result = self.dispatch(idx, ctx).await;
            ctx.end_operation();
            result.map_err(|err| trace(node, err))
        })
    }

    /// Executes all default children in order.
    pub async fn execute_children(
        &self,
        idx: NodeIdx,
        ctx: &mut FlowContext,
    ) -> Result<(), FlowError> {
        for child in self.node(idx).children.clone() {
            self.execute(child, ctx).await?;
        }
        Ok(())
    }

    /// Executes the children wired to a named handle, e.g. `error` or
    /// `component_0`.
    pub async fn execute_children_by_handle(
        &self,
        idx: NodeIdx,
        handle: &str,
        ctx: &mut FlowContext,
    ) -> Result<(), FlowError> {
        let children = self
            .node(idx)
            .child_handles
            .get(handle)
            .cloned()
            .unwrap_or_default();
        for child in children {
            self.execute(child, ctx).await?;
        }
        Ok(())
    }

    async fn dispatch(&self, idx: NodeIdx, ctx: &mut FlowContext) -> Result<(), FlowError> {
        use FlowNodeType::*;

        let node = self.node(idx);
        match node.node_type {
            EntryCommand | EntryComponentButton => {
                self.auto_defer(ctx).await;
                self.execute_children(idx, ctx).await
            }
            EntryEvent => self.execute_children(idx, ctx).await,

            // Options only ever feed compilation; executing one is a no-op.
            OptionCommandArgument | OptionCommandPermissions | OptionCommandContexts
            | OptionEventFilter => Ok(()),

            ActionResponseCreate => self.response_create(idx, ctx).await,
            ActionResponseEdit => self.response_edit(idx, ctx).await,
            ActionResponseDelete => {
                let token = interaction_token(ctx)?;
                ctx.providers
                    .discord
                    .delete_interaction_response(&token)
                    .await?;
                self.execute_children(idx, ctx).await
            }
            ActionResponseDefer => {
                let interaction = require_interaction(ctx)?;
                let (id, token) = (interaction.id.clone(), interaction.token.clone());
                let ephemeral = node.data.message_ephemeral.unwrap_or(false);
                if !ctx
                    .providers
                    .discord
                    .has_created_interaction_response(&token)
                    .await
                {
                    ctx.providers
                        .discord
                        .create_interaction_response(
                            &id,
                            &token,
                            InteractionResponse::Defer { ephemeral },
                        )
                        .await?;
                }
                self.execute_children(idx, ctx).await
            }

            ActionMessageCreate => self.message_create(idx, ctx).await,
            ActionMessageEdit => self.message_edit(idx, ctx).await,
            ActionMessageDelete => {
                let channel_id = self.target_channel(idx, ctx).await?;
                let message_id = self.fill_field(idx, ctx, "message_target").await?;
                let reason = self.audit_reason(idx, ctx).await?;
                ctx.providers
                    .discord
                    .delete_message(&channel_id, &message_id, reason)
                    .await?;
                self.execute_children(idx, ctx).await
            }
            ActionPrivateMessageCreate => self.private_message_create(idx, ctx).await,

            ActionMemberBan => self.member_ban(idx, ctx).await,
            ActionMemberUnban => {
                let guild_id = self.target_guild(idx, ctx).await?;
                let user_id = self.fill_field(idx, ctx, "user_target").await?;
                let reason = self.audit_reason(idx, ctx).await?;
                ctx.providers
                    .discord
                    .unban_member(&guild_id, &user_id, reason)
                    .await?;
                self.execute_children(idx, ctx).await
            }
            ActionMemberKick => {
                let guild_id = self.target_guild(idx, ctx).await?;
                let user_id = self.fill_field(idx, ctx, "user_target").await?;
                let reason = self.audit_reason(idx, ctx).await?;
                ctx.providers
                    .discord
                    .kick_member(&guild_id, &user_id, reason)
                    .await?;
                self.execute_children(idx, ctx).await
            }
            ActionMemberTimeout => self.member_timeout(idx, ctx).await,
            ActionMemberRoleAdd | ActionMemberRoleRemove => {
                self.member_role_change(idx, ctx).await
            }

            ActionMessageGet => {
                let channel_id = self.target_channel(idx, ctx).await?;
                let message_id = self.fill_field(idx, ctx, "message_target").await?;
                let message = ctx.providers.discord.message(&channel_id, &message_id).await?;
                self.store_result(idx, ctx, Thing::Message(message));
                self.execute_children(idx, ctx).await
            }
            ActionMemberGet => {
                let guild_id = self.target_guild(idx, ctx).await?;
                let user_id = self.fill_field(idx, ctx, "user_target").await?;
                let member = ctx.providers.discord.member(&guild_id, &user_id).await?;
                self.store_result(idx, ctx, Thing::Member(member));
                self.execute_children(idx, ctx).await
            }
            ActionUserGet => {
                let user_id = self.fill_field(idx, ctx, "user_target").await?;
                let user = ctx.providers.discord.user(&user_id).await?;
                self.store_result(idx, ctx, Thing::User(user));
                self.execute_children(idx, ctx).await
            }
            ActionChannelGet => {
                let channel_id = self.target_channel(idx, ctx).await?;
                let channel = ctx.providers.discord.channel(&channel_id).await?;
                self.store_result(idx, ctx, Thing::Channel(channel));
                self.execute_children(idx, ctx).await
            }
            ActionRoleGet => {
                let guild_id = self.target_guild(idx, ctx).await?;
                let role_id = self.fill_field(idx, ctx, "role_target").await?;
                let role = ctx.providers.discord.role(&guild_id, &role_id).await?;
                self.store_result(idx, ctx, Thing::Role(role));
                self.execute_children(idx, ctx).await
            }
            ActionGuildGet => {
                let guild_id = self.target_guild(idx, ctx).await?;
                let guild = ctx.providers.discord.guild(&guild_id).await?;
                self.store_result(idx, ctx, Thing::Guild(guild));
                self.execute_children(idx, ctx).await
            }

            ActionHttpRequest => self.http_request(idx, ctx).await,
            ActionAiChatCompletion => self.ai_chat_completion(idx, ctx).await,
            ActionExpressionEvaluate => {
                let raw = self
                    .node(idx)
                    .data
                    .expression
                    .clone()
                    .ok_or(FlowError::MissingNodeData {
                        field: "expression",
                    })?;
                let expression = ctx.fill(&raw).await?;
                let result = ctx.providers.eval.evaluate(&expression).await?;
                self.store_result(idx, ctx, result);
                self.execute_children(idx, ctx).await
            }
            ActionRandomGenerate => self.random_generate(idx, ctx).await,
            ActionLog => {
                let level = node.data.log_level.unwrap_or_default();
                let raw = node.data.log_message.clone().unwrap_or_default();
                let message = ctx.fill(&raw).await?;
                ctx.providers.log.create_log_entry(level, message).await;
                self.execute_children(idx, ctx).await
            }

            ActionVariableSet => self.variable_set(idx, ctx).await,
            ActionVariableGet => {
                let (id, scope) = self.variable_ref(idx, ctx).await?;
                let value = match ctx.providers.variable.variable(&id, scope.as_deref()).await {
                    Ok(value) => value,
                    Err(super::provider::ProviderError::NotFound) => Thing::null(),
                    Err(err) => return Err(err.into()),
                };
                self.store_result(idx, ctx, value);
                self.execute_children(idx, ctx).await
            }
            ActionVariableDelete => {
                let (id, scope) = self.variable_ref(idx, ctx).await?;
                match ctx
                    .providers
                    .variable
                    .delete_variable(&id, scope.as_deref())
                    .await
                {
                    Ok(()) | Err(super::provider::ProviderError::NotFound) => {}
                    Err(err) => return Err(err.into()),
                }
                self.execute_children(idx, ctx).await
            }

            ControlConditionCompare => self.condition_compare(idx, ctx).await,
            ControlConditionItemCompare => self.condition_item_compare(idx, ctx).await,
            ControlConditionItemElse => self.condition_item_else(idx, ctx).await,
            ControlErrorHandler => self.error_handler(idx, ctx).await,
            ControlLoop => self.control_loop(idx, ctx).await,
            ControlLoopEach | ControlLoopEnd => self.execute_children(idx, ctx).await,
            ControlLoopExit => {
                let node_ids: Vec<String> = self
                    .ancestors_with_type(idx, FlowNodeType::ControlLoop)
                    .into_iter()
                    .map(|l| self.node(l).id.clone())
                    .collect();
                let mut state = ctx.state.lock();
                for id in node_ids {
                    state.node_state_mut(&id).loop_exited = true;
                }
                Ok(())
            }
            ControlSleep => self.sleep(idx, ctx).await,

            SuspendResponseModal => self.suspend_response_modal(idx, ctx).await,
        }
    }

    // Entries

    /// Races a deferred response against the flow itself: if nothing has
    /// responded within the grace period, defer so the interaction doesn't
    /// hit Discord's three second response window. Best effort; a flow that
    /// responds (or opens a modal) first wins the race.
    async fn auto_defer(&self, ctx: &mut FlowContext) {
        let Some(interaction) = ctx.entry.interaction() else {
            return;
        };
        let (id, token) = (interaction.id.clone(), interaction.token.clone());
        let discord = ctx.providers.discord.clone();
        tokio::spawn(async move {
            tokio::time::sleep(AUTO_DEFER_GRACE).await;
            if discord.has_created_interaction_response(&token).await {
                return;
            }
            if let Err(err) = discord
                .create_interaction_response(
                    &id,
                    &token,
                    InteractionResponse::Defer { ephemeral: false },
                )
                .await
            {
                tracing::debug!(error = %err, "auto defer failed");
            }
        });
    }

    // Responses and messages

    async fn response_create(&self, idx: NodeIdx, ctx: &mut FlowContext) -> Result<(), FlowError> {
        let interaction = require_interaction(ctx)?;
        let (interaction_id, token) = (interaction.id.clone(), interaction.token.clone());
        let data = self.prepare_message(idx, ctx).await?;

        if ctx
            .providers
            .discord
            .has_created_interaction_response(&token)
            .await
        {
            let message = ctx
                .providers
                .discord
                .create_interaction_followup(&token, data)
                .await?;
            self.store_result(idx, ctx, Thing::Message(message));
        } else {
            ctx.providers
                .discord
                .create_interaction_response(
                    &interaction_id,
                    &token,
                    InteractionResponse::Message(data),
                )
                .await?;
        }
        self.execute_children(idx, ctx).await
    }

    async fn response_edit(&self, idx: NodeIdx, ctx: &mut FlowContext) -> Result<(), FlowError> {
        let token = interaction_token(ctx)?;
        let data = self.prepare_message(idx, ctx).await?;
        let message = ctx
            .providers
            .discord
            .edit_interaction_response(&token, data)
            .await?;
        self.store_result(idx, ctx, Thing::Message(message));
        self.execute_children(idx, ctx).await
    }

    async fn message_create(&self, idx: NodeIdx, ctx: &mut FlowContext) -> Result<(), FlowError> {
        let channel_id = self.target_channel(idx, ctx).await?;
        let data = self.prepare_message(idx, ctx).await?;
        let message = ctx.providers.discord.create_message(&channel_id, data).await?;
        self.store_result(idx, ctx, Thing::Message(message));
        self.execute_children(idx, ctx).await
    }

    async fn message_edit(&self, idx: NodeIdx, ctx: &mut FlowContext) -> Result<(), FlowError> {
        let channel_id = self.target_channel(idx, ctx).await?;
        let message_id = self.fill_field(idx, ctx, "message_target").await?;
        let data = self.prepare_message(idx, ctx).await?;
        let message = ctx
            .providers
            .discord
            .edit_message(&channel_id, &message_id, data)
            .await?;
        self.store_result(idx, ctx, Thing::Message(message));
        self.execute_children(idx, ctx).await
    }

    async fn private_message_create(
        &self,
        idx: NodeIdx,
        ctx: &mut FlowContext,
    ) -> Result<(), FlowError> {
        let raw_target = self.node(idx).data.user_target.clone();
        let user_id = match raw_target {
            Some(raw) => ctx.fill(&raw).await?,
            None => ctx
                .entry
                .interaction()
                .and_then(|i| i.invoker())
                .map(|u| u.id.clone())
                .ok_or(FlowError::MissingNodeData {
                    field: "user_target",
                })?,
        };
        let data = self.prepare_message(idx, ctx).await?;
        let channel = ctx.providers.discord.create_private_channel(&user_id).await?;
        let message = ctx.providers.discord.create_message(&channel.id, data).await?;
        self.store_result(idx, ctx, Thing::Message(message));
        self.execute_children(idx, ctx).await
    }

    /// Fills placeholders in the node's message payload and allocates a
    /// resume point for interactive components, stamping their custom IDs.
    async fn prepare_message(
        &self,
        idx: NodeIdx,
        ctx: &mut FlowContext,
    ) -> Result<MessageData, FlowError> {
        let node = self.node(idx);
        let mut data = match &node.data.message_template_id {
            Some(raw) => {
                let template_id = ctx.fill(raw).await?;
                ctx.providers
                    .message_template
                    .message_data(&template_id)
                    .await?
            }
            None => node
                .data
                .message_data
                .clone()
                .ok_or(FlowError::MissingNodeData {
                    field: "message_data",
                })?,
        };
        data.content = ctx.fill(&data.content).await?;
        if let Some(ephemeral) = node.data.message_ephemeral {
            data.ephemeral = ephemeral;
        }

        let has_components = data.components.iter().any(|row| !row.components.is_empty());
        if has_components {
            let resume_point = ctx
                .providers
                .resume_point
                .create_resume_point(
                    ResumePointKind::MessageComponent,
                    &node.id,
                    ctx.state_snapshot(),
                )
                .await?;
            let mut index = 0usize;
            for row in &mut data.components {
                for component in &mut row.components {
                    let crate::model::Component::Button { custom_id, label, .. } = component;
                    if custom_id.is_empty() {
                        *custom_id = component_custom_id(&resume_point.id, index);
                    }
                    let filled = ctx.fill(label).await?;
                    *label = filled;
                    index += 1;
                }
            }
        }
        Ok(data)
    }

    // Moderation

    async fn member_ban(&self, idx: NodeIdx, ctx: &mut FlowContext) -> Result<(), FlowError> {
        let guild_id = self.target_guild(idx, ctx).await?;
        let user_id = self.fill_field(idx, ctx, "user_target").await?;
        let reason = self.audit_reason(idx, ctx).await?;
        let delete_seconds = match self.node(idx).data.member_ban_delete_message_seconds.clone() {
            Some(raw) => ctx.fill(&raw).await?.parse().unwrap_or(0),
            None => 0,
        };
        ctx.providers
            .discord
            .ban_member(&guild_id, &user_id, delete_seconds, reason)
            .await?;
        self.execute_children(idx, ctx).await
    }

    async fn member_timeout(&self, idx: NodeIdx, ctx: &mut FlowContext) -> Result<(), FlowError> {
        let guild_id = self.target_guild(idx, ctx).await?;
        let user_id = self.fill_field(idx, ctx, "user_target").await?;
        let reason = self.audit_reason(idx, ctx).await?;
        let seconds: i64 = match self.node(idx).data.member_timeout_seconds.clone() {
            Some(raw) => ctx.fill(&raw).await?.parse().unwrap_or(0),
            None => 0,
        };
        let until = Utc::now() + chrono::Duration::seconds(seconds.max(0));
        ctx.providers
            .discord
            .timeout_member(&guild_id, &user_id, until, reason)
            .await?;
        self.execute_children(idx, ctx).await
    }

    async fn member_role_change(
        &self,
        idx: NodeIdx,
        ctx: &mut FlowContext,
    ) -> Result<(), FlowError> {
        let guild_id = self.target_guild(idx, ctx).await?;
        let user_id = self.fill_field(idx, ctx, "user_target").await?;
        let role_id = self.fill_field(idx, ctx, "role_target").await?;
        let reason = self.audit_reason(idx, ctx).await?;
        match self.node(idx).node_type {
            FlowNodeType::ActionMemberRoleAdd => {
                ctx.providers
                    .discord
                    .add_member_role(&guild_id, &user_id, &role_id, reason)
                    .await?;
            }
            _ => {
                ctx.providers
                    .discord
                    .remove_member_role(&guild_id, &user_id, &role_id, reason)
                    .await?;
            }
        }
        self.execute_children(idx, ctx).await
    }

    // External calls

    async fn http_request(&self, idx: NodeIdx, ctx: &mut FlowContext) -> Result<(), FlowError> {
        let data = self
            .node(idx)
            .data
            .http_request_data
            .clone()
            .ok_or(FlowError::MissingNodeData {
                field: "http_request_data",
            })?;
        let mut request = HttpRequest {
            method: data.method,
            url: ctx.fill(&data.url).await?,
            headers: data.headers.clone(),
            body: None,
        };
        if let Some(body) = &data.body {
            request.body = Some(ctx.fill(body).await?);
        }
        let response = ctx.providers.http.request(request).await?;
        self.store_result(idx, ctx, Thing::HttpResponse(response));
        self.execute_children(idx, ctx).await
    }

    async fn ai_chat_completion(
        &self,
        idx: NodeIdx,
        ctx: &mut FlowContext,
    ) -> Result<(), FlowError> {
        let data = self
            .node(idx)
            .data
            .ai_chat_completion_data
            .clone()
            .ok_or(FlowError::MissingNodeData {
                field: "ai_chat_completion_data",
            })?;
        let params = ChatCompletionParams {
            model: data.model.clone(),
            system_prompt: match &data.system_prompt {
                Some(prompt) => Some(ctx.fill(prompt).await?),
                None => None,
            },
            prompt: ctx.fill(&data.prompt).await?,
            max_completion_tokens: data.max_completion_tokens,
        };
        let completion = ctx.providers.ai.chat_completion(params).await?;
        self.store_result(idx, ctx, Thing::String(completion));
        self.execute_children(idx, ctx).await
    }

    async fn random_generate(&self, idx: NodeIdx, ctx: &mut FlowContext) -> Result<(), FlowError> {
        let node = self.node(idx);
        let min: i64 = match node.data.random_min.clone() {
            Some(raw) => ctx.fill(&raw).await?.parse().unwrap_or(0),
            None => 0,
        };
        let max: i64 = match node.data.random_max.clone() {
            Some(raw) => ctx.fill(&raw).await?.parse().unwrap_or(0),
            None => 0,
        };
        let (low, high) = if min <= max { (min, max) } else { (max, min) };
        let value = rand::rng().random_range(low..=high);
        self.store_result(idx, ctx, Thing::Int(value));
        self.execute_children(idx, ctx).await
    }

    // Variables

    async fn variable_ref(
        &self,
        idx: NodeIdx,
        ctx: &mut FlowContext,
    ) -> Result<(String, Option<String>), FlowError> {
        let node = self.node(idx);
        let id = node
            .data
            .variable_id
            .clone()
            .ok_or(FlowError::MissingNodeData {
                field: "variable_id",
            })?;
        let scope = match node.data.variable_scope.clone() {
            Some(raw) => {
                let filled = ctx.fill(&raw).await?;
                (!filled.is_empty()).then_some(filled)
            }
            None => None,
        };
        Ok((id, scope))
    }

    async fn variable_set(&self, idx: NodeIdx, ctx: &mut FlowContext) -> Result<(), FlowError> {
        let (id, scope) = self.variable_ref(idx, ctx).await?;
        let node = self.node(idx);
        let raw = node.data.variable_value.clone().unwrap_or_default();
        let value = Thing::guess(serde_json::Value::String(ctx.fill(&raw).await?));

        let operation = node.data.variable_operation.unwrap_or_default();
        let new_value = match operation {
            VariableOperation::Overwrite => value,
            _ => {
                let current = match ctx.providers.variable.variable(&id, scope.as_deref()).await
                {
                    Ok(current) => current,
                    Err(super::provider::ProviderError::NotFound) => Thing::null(),
                    Err(err) => return Err(err.into()),
                };
                match operation {
                    VariableOperation::Append => current.append(&value),
                    VariableOperation::Increment => current.add(&value),
                    VariableOperation::Decrement => current.sub(&value),
                    VariableOperation::Overwrite => unreachable!(),
                }
            }
        };

        ctx.providers
            .variable
            .set_variable(&id, scope.as_deref(), new_value.clone())
            .await?;
        self.store_result(idx, ctx, new_value);
        self.execute_children(idx, ctx).await
    }

    // Control flow

    async fn condition_compare(
        &self,
        idx: NodeIdx,
        ctx: &mut FlowContext,
    ) -> Result<(), FlowError> {
        let node = self.node(idx);
        let raw = node.data.condition_base_value.clone().unwrap_or_default();
        let base = Thing::guess(serde_json::Value::String(ctx.fill(&raw).await?));
        ctx.state
            .lock()
            .node_state_mut(&node.id)
            .condition_base_value = Some(base);

        // Items run in edge order; else branches always run last so every
        // comparison gets its chance to match first.
        let children = self.node(idx).children.clone();
        let (items, elses): (Vec<NodeIdx>, Vec<NodeIdx>) = children
            .into_iter()
            .partition(|&c| self.node(c).node_type != FlowNodeType::ControlConditionItemElse);
        for child in items.into_iter().chain(elses) {
            self.execute(child, ctx).await?;
        }
        Ok(())
    }

    async fn condition_item_compare(
        &self,
        idx: NodeIdx,
        ctx: &mut FlowContext,
    ) -> Result<(), FlowError> {
        let Some(parent) =
            self.find_direct_parent_with_type(idx, FlowNodeType::ControlConditionCompare)
        else {
            return Ok(());
        };
        let parent_node = self.node(parent);
        let allow_multiple = parent_node.data.condition_allow_multiple.unwrap_or(false);
        let parent_id = parent_node.id.clone();

        if ctx.state.lock().condition_item_met(&parent_id) && !allow_multiple {
            return Ok(());
        }

        let base = ctx
            .state
            .lock()
            .node_state(&parent_id)
            .and_then(|s| s.condition_base_value.clone())
            .unwrap_or_default();

        let node = self.node(idx);
        let raw = node.data.condition_item_value.clone().unwrap_or_default();
        let value = Thing::guess(serde_json::Value::String(ctx.fill(&raw).await?));

        use super::data::ComparisonMode::*;
        let mode = node.data.condition_item_mode.unwrap_or(Equal);
        let matched = match mode {
            Equal => base.equals(&value),
            NotEqual => !base.equals(&value),
            GreaterThan => base.greater_than(&value),
            LessThan => base.less_than(&value),
            GreaterThanOrEqual => base.greater_than_or_equal(&value),
            LessThanOrEqual => base.less_than_or_equal(&value),
            Contains => base.contains(&value),
        };

        if matched {
            ctx.state
                .lock()
                .node_state_mut(&parent_id)
                .condition_item_met = true;
            self.execute_children(idx, ctx).await?;
        }
        Ok(())
    }

    async fn condition_item_else(
        &self,
        idx: NodeIdx,
        ctx: &mut FlowContext,
    ) -> Result<(), FlowError> {
        let Some(parent) =
            self.find_direct_parent_with_type(idx, FlowNodeType::ControlConditionCompare)
        else {
            return Ok(());
        };
        let parent_id = self.node(parent).id.clone();
        if !ctx.state.lock().condition_item_met(&parent_id) {
            self.execute_children(idx, ctx).await?;
        }
        Ok(())
    }

    /// Runs the default branch; on failure records the error message as the
    /// node result and runs the `error` branch instead of propagating.
    async fn error_handler(&self, idx: NodeIdx, ctx: &mut FlowContext) -> Result<(), FlowError> {
        if let Err(err) = self.execute_children(idx, ctx).await {
            let node_id = self.node(idx).id.clone();
            tracing::debug!(node_id = %node_id, error = %err, "error handler caught failure");
            ctx.state
                .lock()
                .store_result(&node_id, Thing::String(err.trace_message()));
            self.execute_children_by_handle(idx, "error", ctx).await?;
        }
        Ok(())
    }

    async fn control_loop(&self, idx: NodeIdx, ctx: &mut FlowContext) -> Result<(), FlowError> {
        let node = self.node(idx);
        let node_id = node.id.clone();
        let raw = node.data.loop_count.clone().unwrap_or_default();
        let count = Thing::guess(serde_json::Value::String(ctx.fill(&raw).await?)).as_int();

        let each: Vec<NodeIdx> = self
            .node(idx)
            .children
            .iter()
            .copied()
            .filter(|&c| self.node(c).node_type == FlowNodeType::ControlLoopEach)
            .collect();
        let end: Vec<NodeIdx> = self
            .node(idx)
            .children
            .iter()
            .copied()
            .filter(|&c| self.node(c).node_type == FlowNodeType::ControlLoopEnd)
            .collect();

        for _ in 0..count.max(0) {
            if ctx.state.lock().loop_exited(&node_id) {
                break;
            }
            for &child in &each {
                self.execute(child, ctx).await?;
            }
        }
        for child in end {
            self.execute(child, ctx).await?;
        }
        Ok(())
    }

    async fn sleep(&self, idx: NodeIdx, ctx: &mut FlowContext) -> Result<(), FlowError> {
        let raw = self
            .node(idx)
            .data
            .sleep_duration_seconds
            .clone()
            .unwrap_or_default();
        let seconds: f64 = ctx.fill(&raw).await?.parse().unwrap_or(0.0);
        if seconds > 0.0 {
            let wanted = std::time::Duration::from_secs_f64(seconds);
            // Never sleep past the invocation deadline.
            let capped = wanted.min(ctx.remaining_time());
            tokio::time::sleep(capped).await;
        }
        self.execute_children(idx, ctx).await
    }

    // Suspension

    /// Persists a resume point and opens the modal. Children intentionally
    /// do not run here; they run when the submit comes back.
    async fn suspend_response_modal(
        &self,
        idx: NodeIdx,
        ctx: &mut FlowContext,
    ) -> Result<(), FlowError> {
        let interaction = require_interaction(ctx)?;
        let (interaction_id, token) = (interaction.id.clone(), interaction.token.clone());
        let node = self.node(idx);
        let mut modal = node
            .data
            .modal_data
            .clone()
            .ok_or(FlowError::MissingNodeData { field: "modal_data" })?;

        let resume_point = ctx
            .providers
            .resume_point
            .create_resume_point(
                ResumePointKind::ModalSubmit,
                &node.id,
                ctx.state_snapshot(),
            )
            .await?;
        modal.custom_id = modal_custom_id(&resume_point.id);
        modal.title = ctx.fill(&modal.title).await?;

        ctx.providers
            .discord
            .create_interaction_response(
                &interaction_id,
                &token,
                InteractionResponse::Modal(modal),
            )
            .await?;
        Ok(())
    }

    // Shared helpers

    fn store_result(&self, idx: NodeIdx, ctx: &mut FlowContext, value: Thing) {
        ctx.state.lock().store_result(&self.node(idx).id, value);
    }

    async fn fill_field(
        &self,
        idx: NodeIdx,
        ctx: &mut FlowContext,
        field: &'static str,
    ) -> Result<String, FlowError> {
        let node = self.node(idx);
        let raw = match field {
            "message_target" => node.data.message_target.clone(),
            "user_target" => node.data.user_target.clone(),
            "role_target" => node.data.role_target.clone(),
            _ => None,
        }
        .ok_or(FlowError::MissingNodeData { field })?;
        ctx.fill(&raw).await
    }

    /// Explicit channel target, falling back to the triggering channel.
    async fn target_channel(
        &self,
        idx: NodeIdx,
        ctx: &mut FlowContext,
    ) -> Result<String, FlowError> {
        if let Some(raw) = self.node(idx).data.channel_target.clone() {
            let filled = ctx.fill(&raw).await?;
            if !filled.is_empty() {
                return Ok(filled);
            }
        }
        ctx.entry
            .channel_id()
            .map(str::to_owned)
            .ok_or(FlowError::MissingNodeData {
                field: "channel_target",
            })
    }

    async fn target_guild(
        &self,
        idx: NodeIdx,
        ctx: &mut FlowContext,
    ) -> Result<String, FlowError> {
        if let Some(raw) = self.node(idx).data.guild_target.clone() {
            let filled = ctx.fill(&raw).await?;
            if !filled.is_empty() {
                return Ok(filled);
            }
        }
        ctx.entry
            .guild_id()
            .map(str::to_owned)
            .ok_or(FlowError::MissingNodeData {
                field: "guild_target",
            })
    }

    async fn audit_reason(
        &self,
        idx: NodeIdx,
        ctx: &mut FlowContext,
    ) -> Result<Option<String>, FlowError> {
        match self.node(idx).data.audit_log_reason.clone() {
            Some(raw) => Ok(Some(ctx.fill(&raw).await?)),
            None => Ok(None),
        }
    }
}

fn require_interaction(ctx: &FlowContext) -> Result<&crate::model::Interaction, FlowError> {
    ctx.entry.interaction().ok_or(FlowError::NotAnInteraction)
}

fn interaction_token(ctx: &FlowContext) -> Result<String, FlowError> {
    Ok(require_interaction(ctx)?.token.clone())
}

fn trace(node: &CompiledNode, err: FlowError) -> FlowError {
    FlowError::Node {
        node_id: node.id.clone(),
        node_type: node.node_type.as_str().to_owned(),
        custom_label: node.data.custom_label.clone(),
        source: Box::new(err),
    }
}
